use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::strategy::ChunkingStrategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub document_id: String,
    pub chunking_strategy: ChunkingStrategy,
}

/// One inbound message of the extraction event protocol, after
/// normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractionEvent {
    Status {
        message: String,
    },
    DocumentInfo {
        info: serde_json::Value,
    },
    ChunkingComplete {
        total_chunks: u32,
    },
    ChunkStart {
        index: u32,
    },
    ChunkComplete {
        index: u32,
    },
    ChunkError {
        index: u32,
        message: String,
    },
    LlmStart,
    LlmToken {
        text: String,
    },
    LlmComplete,
    LlmError {
        message: String,
    },
    ExtractionComplete(ExtractionSummary),
    Error {
        message: String,
    },
}

impl ExtractionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionEvent::Status { .. } => "status",
            ExtractionEvent::DocumentInfo { .. } => "document_info",
            ExtractionEvent::ChunkingComplete { .. } => "chunking_complete",
            ExtractionEvent::ChunkStart { .. } => "chunk_start",
            ExtractionEvent::ChunkComplete { .. } => "chunk_complete",
            ExtractionEvent::ChunkError { .. } => "chunk_error",
            ExtractionEvent::LlmStart => "llm_start",
            ExtractionEvent::LlmToken { .. } => "llm_token",
            ExtractionEvent::LlmComplete => "llm_complete",
            ExtractionEvent::LlmError { .. } => "llm_error",
            ExtractionEvent::ExtractionComplete(_) => "extraction_complete",
            ExtractionEvent::Error { .. } => "error",
        }
    }
}

/// Counts reported by a successful extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractionSummary {
    pub entity_count: u64,
    pub relationship_count: u64,
    #[serde(default)]
    pub transcript: Option<String>,
}

/// The single terminal result of an extraction, from either the stream
/// or the fallback call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminalResult {
    Succeeded(ExtractionSummary),
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    Pending,
    Succeeded {
        entity_count: u64,
        relationship_count: u64,
        transcript: String,
    },
    Failed {
        message: String,
    },
}

impl SessionOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionOutcome::Pending)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Streaming,
    Fallback,
    Terminal,
}

/// Chunk-level progress derived from `chunk_*` events.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkProgress {
    pub total: Option<u32>,
    pub started: u32,
    pub completed: u32,
    pub failed: u32,
    pub current: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub received_at: DateTime<Utc>,
    pub event: ExtractionEvent,
}

/// Point-in-time view of an extraction session for observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub document_id: String,
    pub strategy: ChunkingStrategy,
    pub phase: SessionPhase,
    pub transcript: String,
    pub progress: ChunkProgress,
    pub last_status: Option<String>,
    pub events: Vec<LoggedEvent>,
    pub anomalies: u64,
    pub fallback_used: bool,
    pub outcome: SessionOutcome,
}

/// Raw messages of a streaming extraction channel, one JSON document each.
pub type EventStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Open the long-lived streaming channel for one document.
    async fn open_stream(&self, request: &ExtractionRequest) -> Result<EventStream>;

    /// Non-streaming extraction; returns the raw response body.
    async fn extract(&self, request: &ExtractionRequest) -> Result<String>;
}
