use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::strategy::ChunkingStrategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub parser_url: String,
    pub extraction_url: String,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub server_host: String,
    pub server_port: u16,
    pub document_root: Option<String>,
    pub parse_timeout_secs: u64,
    pub fallback_timeout_secs: u64,
    pub stream_idle_timeout_secs: Option<u64>,
    pub default_strategy: ChunkingStrategy,
}

/// Settings for the document pipeline steps.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub parse_timeout: Duration,
}

/// Settings for extraction sessions.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub fallback_timeout: Duration,
    pub stream_idle_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parse_timeout: Duration::from_secs(120),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            fallback_timeout: Duration::from_secs(300),
            stream_idle_timeout: None,
        }
    }
}

fn env_secs(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let default_strategy = match std::env::var("DEFAULT_CHUNKING_STRATEGY") {
            Ok(name) => name.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default chunking strategy");
                ChunkingStrategy::default()
            }),
            Err(_) => ChunkingStrategy::default(),
        };

        Self {
            parser_url: std::env::var("PARSER_URL")
                .unwrap_or_else(|_| "http://localhost:8070".into()),
            extraction_url: std::env::var("EXTRACTION_URL")
                .unwrap_or_else(|_| "http://localhost:8000".into()),
            neo4j_uri: std::env::var("NEO4J_URI").unwrap_or_else(|_| "bolt://localhost:7687".into()),
            neo4j_user: std::env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".into()),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or_else(|_| "docket".into()),
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            document_root: std::env::var("DOCUMENT_ROOT").ok().filter(|r| !r.trim().is_empty()),
            parse_timeout_secs: env_secs("PARSE_TIMEOUT_SECS").unwrap_or(120),
            fallback_timeout_secs: env_secs("FALLBACK_TIMEOUT_SECS").unwrap_or(300),
            stream_idle_timeout_secs: env_secs("STREAM_IDLE_TIMEOUT_SECS"),
            default_strategy,
        }
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            parse_timeout: Duration::from_secs(self.parse_timeout_secs),
        }
    }

    pub fn extraction(&self) -> ExtractionConfig {
        ExtractionConfig {
            fallback_timeout: Duration::from_secs(self.fallback_timeout_secs),
            stream_idle_timeout: self.stream_idle_timeout_secs.map(Duration::from_secs),
        }
    }
}
