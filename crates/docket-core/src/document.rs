use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A source file that has been located and read, ready for parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub file: String,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedDocument {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub references: Vec<serde_json::Value>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Normalized result of a parsed document, handed to persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub file: String,
    pub session_id: Option<String>,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub reference_count: usize,
    pub content_length: usize,
    pub parsed_at: DateTime<Utc>,
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn read(&self, file: &str) -> Result<SourceDocument>;
}

/// External parser that turns a source file into structured metadata.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Check that the parser is reachable before handing it work.
    async fn ping(&self) -> Result<()>;
    async fn parse(&self, source: &SourceDocument) -> Result<ParsedDocument>;
}
