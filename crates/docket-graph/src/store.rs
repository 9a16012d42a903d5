use async_trait::async_trait;
use neo4rs::{query, Graph};
use std::future::Future;

use docket_core::config::AppConfig;
use docket_core::document::DocumentRecord;
use docket_core::error::{DocketError, Result};
use docket_core::store::ResultStore;

/// Timeout for all Neo4j operations (seconds).
const NEO4J_TIMEOUT_SECS: u64 = 5;

const PERSIST_DOCUMENT: &str = "MERGE (d:ProcessedDocument {file: $file}) \
     ON CREATE SET d.first_parsed = $parsed_at \
     SET d.title = $title, d.authors = $authors, d.session_id = $session_id, \
       d.reference_count = $reference_count, d.content_length = $content_length, \
       d.parsed_at = $parsed_at";

pub struct Neo4jResultStore {
    graph: Option<Graph>,
}

impl Neo4jResultStore {
    pub async fn new(config: &AppConfig) -> Self {
        match Graph::new(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password).await {
            Ok(graph) => {
                tracing::info!(uri = %config.neo4j_uri, "Connected to Neo4j");
                Self { graph: Some(graph) }
            }
            Err(e) => {
                tracing::warn!(uri = %config.neo4j_uri, error = %e, "Failed to connect to Neo4j, running in degraded mode");
                Self { graph: None }
            }
        }
    }

    fn graph(&self) -> Result<&Graph> {
        self.graph
            .as_ref()
            .ok_or_else(|| DocketError::Persistence("Neo4j not connected".into()))
    }
}

/// Wrap any async operation with a timeout, converting timeout to DocketError::Timeout.
async fn timed<T, F: Future<Output = T>>(op: F) -> std::result::Result<T, DocketError> {
    tokio::time::timeout(std::time::Duration::from_secs(NEO4J_TIMEOUT_SECS), op)
        .await
        .map_err(|_| {
            tracing::warn!("Neo4j operation timed out after {}s", NEO4J_TIMEOUT_SECS);
            DocketError::Timeout(format!("Neo4j operation timed out after {}s", NEO4J_TIMEOUT_SECS))
        })
}

#[async_trait]
impl ResultStore for Neo4jResultStore {
    async fn persist(&self, record: &DocumentRecord) -> Result<()> {
        let q = query(PERSIST_DOCUMENT)
            .param("file", record.file.clone())
            .param("title", record.title.clone().unwrap_or_default())
            .param("authors", record.authors.clone())
            .param("session_id", record.session_id.clone().unwrap_or_default())
            .param("reference_count", record.reference_count as i64)
            .param("content_length", record.content_length as i64)
            .param("parsed_at", record.parsed_at.to_rfc3339());

        timed(self.graph()?.run(q))
            .await?
            .map_err(|e| DocketError::Persistence(format!("Failed to store document {}: {}", record.file, e)))?;

        tracing::debug!(
            file = %record.file,
            references = record.reference_count,
            "Stored document record"
        );
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut stream = timed(self.graph()?.execute(query("RETURN 1 AS ok")))
            .await?
            .map_err(|e| DocketError::Persistence(format!("Neo4j ping failed: {}", e)))?;

        stream
            .next()
            .await
            .map_err(|e| DocketError::Persistence(format!("Neo4j ping failed: {}", e)))?;
        Ok(())
    }
}
