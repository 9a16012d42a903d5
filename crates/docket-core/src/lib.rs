pub mod api_types;
pub mod config;
pub mod document;
pub mod error;
pub mod extraction;
pub mod job;
pub mod store;
pub mod strategy;
mod tracker;

pub use config::{AppConfig, ExtractionConfig, PipelineConfig};
pub use document::{DocumentParser, DocumentRecord, DocumentSource, ParsedDocument, SourceDocument};
pub use error::{DocketError, Result};
pub use extraction::{
    ChunkProgress, EventStream, ExtractionEvent, ExtractionRequest, ExtractionService,
    ExtractionSummary, LoggedEvent, SessionOutcome, SessionPhase, SessionSnapshot, TerminalResult,
};
pub use job::{JobState, ProcessingJob, Step, StepStatus, DOCUMENT_PIPELINE};
pub use store::ResultStore;
pub use strategy::{ChunkingStrategy, StrategyProfile, Tradeoff};
