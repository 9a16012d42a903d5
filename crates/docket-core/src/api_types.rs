use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::DocumentRecord;
use crate::extraction::{SessionOutcome, SessionSnapshot};
use crate::job::{JobState, ProcessingJob, Step};
use crate::strategy::{ChunkingStrategy, StrategyProfile};

// --- Run records ---

/// Normalized audit entry for one finished batch job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub file: String,
    pub session_id: Option<String>,
    pub success: bool,
    pub failed_step: Option<String>,
    pub error: Option<String>,
    pub record: Option<DocumentRecord>,
    pub steps: Vec<Step>,
    pub finished_at: DateTime<Utc>,
}

impl From<&ProcessingJob> for JobRecord {
    fn from(job: &ProcessingJob) -> Self {
        Self {
            job_id: job.id,
            file: job.file.clone(),
            session_id: job.session_id.clone(),
            success: job.state() == JobState::Succeeded,
            failed_step: job.failed_step().map(|s| s.label.clone()),
            error: job.error().map(str::to_string),
            record: job.result().cloned(),
            steps: job.steps().to_vec(),
            finished_at: job.finished_at().unwrap_or_else(Utc::now),
        }
    }
}

/// Normalized audit entry for one finished extraction session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub document_id: String,
    pub strategy: ChunkingStrategy,
    pub success: bool,
    pub entity_count: u64,
    pub relationship_count: u64,
    pub transcript: Option<String>,
    pub error: Option<String>,
    pub fallback_used: bool,
    pub finished_at: DateTime<Utc>,
}

impl ExtractionRecord {
    pub fn new(
        document_id: &str,
        strategy: ChunkingStrategy,
        outcome: &SessionOutcome,
        fallback_used: bool,
    ) -> Self {
        let (success, entity_count, relationship_count, transcript, error) = match outcome {
            SessionOutcome::Succeeded {
                entity_count,
                relationship_count,
                transcript,
            } => (true, *entity_count, *relationship_count, Some(transcript.clone()), None),
            SessionOutcome::Failed { message } => (false, 0, 0, None, Some(message.clone())),
            SessionOutcome::Pending => {
                (false, 0, 0, None, Some("session ended without an outcome".to_string()))
            }
        };
        Self {
            document_id: document_id.to_string(),
            strategy,
            success,
            entity_count,
            relationship_count,
            transcript,
            error,
            fallback_used,
            finished_at: Utc::now(),
        }
    }
}

/// Aggregate progress of one batch queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub current: Option<String>,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub records: Vec<JobRecord>,
}

impl BatchSummary {
    pub fn new(progress: &BatchProgress, records: Vec<JobRecord>) -> Self {
        let succeeded = records.iter().filter(|r| r.success).count();
        Self {
            total: progress.total,
            completed: progress.completed,
            succeeded,
            failed: records.len() - succeeded,
            records,
        }
    }
}

// --- Health ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub parser_connected: bool,
    pub store_connected: bool,
    pub active_batches: usize,
    pub active_extractions: usize,
}

// --- Batches ---

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateBatchRequest {
    pub files: Vec<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueFilesRequest {
    pub files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchAcceptedResponse {
    pub batch_id: Uuid,
    pub job_ids: Vec<Uuid>,
    pub progress: BatchProgress,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchStatusResponse {
    pub batch_id: Uuid,
    pub progress: BatchProgress,
    pub records: Vec<JobRecord>,
}

// --- Extractions ---

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateExtractionRequest {
    pub document_ids: Vec<String>,
    #[serde(default)]
    pub strategy: Option<ChunkingStrategy>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractionAcceptedResponse {
    pub run_id: Uuid,
    pub strategy: ChunkingStrategy,
    pub documents: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractionStatusResponse {
    pub run_id: Uuid,
    pub finished: bool,
    pub active: Option<SessionSnapshot>,
    pub records: Vec<ExtractionRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StrategyListResponse {
    pub default: ChunkingStrategy,
    pub strategies: Vec<StrategyProfile>,
}
