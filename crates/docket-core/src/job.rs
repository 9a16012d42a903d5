use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::DocumentRecord;

/// Step labels of the document processing pipeline, in execution order.
pub const DOCUMENT_PIPELINE: [&str; 5] = [
    "Read source",
    "Connect to parser",
    "Parse document",
    "Transform result",
    "Persist result",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Zero-based position in the job's step list.
    pub order: usize,
    pub label: String,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// One document's traversal of an ordered list of named steps.
///
/// Step statuses are only changed through the tracker operations
/// (`reset`, `advance`, `fail`, `succeed`), which keep them monotonic
/// along the step order. Once the job is terminal it no longer changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: Uuid,
    pub file: String,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub(crate) steps: Vec<Step>,
    pub(crate) state: JobState,
    pub(crate) result: Option<DocumentRecord>,
    pub(crate) error: Option<String>,
    pub(crate) finished_at: Option<DateTime<Utc>>,
}

impl ProcessingJob {
    pub fn new<I, S>(file: impl Into<String>, session_id: Option<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let steps = labels
            .into_iter()
            .enumerate()
            .map(|(order, label)| Step {
                order,
                label: label.into(),
                status: StepStatus::Pending,
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            file: file.into(),
            session_id,
            created_at: Utc::now(),
            steps,
            state: JobState::Queued,
            result: None,
            error: None,
            finished_at: None,
        }
    }

    /// A job running the standard document pipeline.
    pub fn document(file: impl Into<String>, session_id: Option<String>) -> Self {
        Self::new(file, session_id, DOCUMENT_PIPELINE)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn result(&self) -> Option<&DocumentRecord> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Index of the first step that has not completed, or the step count
    /// once every step has completed.
    pub fn current_step(&self) -> usize {
        self.steps
            .iter()
            .position(|s| s.status != StepStatus::Completed)
            .unwrap_or(self.steps.len())
    }

    pub fn step_index(&self, label: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.label == label)
    }

    pub fn failed_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }
}
