use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use docket_core::{AppConfig, DocumentParser, ResultStore};
use docket_pipeline::{BatchRun, ExtractionRun, Orchestrator};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Orchestrator,
    pub parser: Arc<dyn DocumentParser>,
    pub store: Arc<dyn ResultStore>,
    pub batches: Arc<RwLock<HashMap<Uuid, BatchRun>>>,
    pub extractions: Arc<RwLock<HashMap<Uuid, ExtractionRun>>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        orchestrator: Orchestrator,
        parser: Arc<dyn DocumentParser>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            parser,
            store,
            batches: Arc::new(RwLock::new(HashMap::new())),
            extractions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
