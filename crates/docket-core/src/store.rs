use async_trait::async_trait;

use crate::document::DocumentRecord;
use crate::error::Result;

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn persist(&self, record: &DocumentRecord) -> Result<()>;
    async fn ping(&self) -> Result<()>;
}
