//! Step state tracking for a single [`ProcessingJob`].
//!
//! Works on whatever ordered step list the job was built with. The
//! operations reject any transition that would break monotonicity:
//! a later step may only leave `pending` once every earlier step has
//! completed, and at most one step is ever `in_progress`.

use chrono::Utc;

use crate::document::DocumentRecord;
use crate::error::{DocketError, Result};
use crate::job::{JobState, ProcessingJob, StepStatus};

impl ProcessingJob {
    /// Set every step back to `pending`.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        for step in &mut self.steps {
            step.status = StepStatus::Pending;
        }
        self.state = JobState::Queued;
        Ok(())
    }

    /// Set the status of the step at `step`.
    ///
    /// `completed` and `in_progress` require every earlier step to be
    /// completed. `in_progress` and `pending` require every later step to
    /// still be pending. `failed` behaves like [`ProcessingJob::fail`].
    pub fn advance(&mut self, step: usize, status: StepStatus) -> Result<()> {
        self.ensure_open()?;
        self.ensure_step(step)?;

        match status {
            StepStatus::Failed => {
                let label = self.steps[step].label.clone();
                return self.fail(step, format!("{label} failed"));
            }
            StepStatus::Completed => {
                self.ensure_earlier_completed(step)?;
            }
            StepStatus::InProgress => {
                self.ensure_earlier_completed(step)?;
                self.ensure_later_pending(step)?;
                self.state = JobState::Running;
            }
            StepStatus::Pending => {
                self.ensure_later_pending(step)?;
            }
        }

        self.steps[step].status = status;
        tracing::debug!(
            job_id = %self.id,
            step = %self.steps[step].label,
            status = ?status,
            "Step advanced"
        );
        Ok(())
    }

    /// Mark `step` failed and the job terminal-failed. Later steps stay
    /// `pending` and are never attempted.
    pub fn fail(&mut self, step: usize, error: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        self.ensure_step(step)?;
        self.ensure_earlier_completed(step)?;

        let error = error.into();
        self.steps[step].status = StepStatus::Failed;
        for later in &mut self.steps[step + 1..] {
            later.status = StepStatus::Pending;
        }
        tracing::warn!(
            job_id = %self.id,
            file = %self.file,
            step = %self.steps[step].label,
            error = %error,
            "Step failed"
        );
        self.finish(JobState::Failed, None, Some(error));
        Ok(())
    }

    /// Mark the job terminal-succeeded. Every step must have completed.
    pub fn succeed(&mut self, record: DocumentRecord) -> Result<()> {
        self.ensure_open()?;
        if let Some(pending) = self.steps.iter().find(|s| s.status != StepStatus::Completed) {
            return Err(DocketError::StepOrder {
                step: "job completion".into(),
                blocking: pending.label.clone(),
            });
        }
        self.finish(JobState::Succeeded, Some(record), None);
        Ok(())
    }

    /// Fail whichever step the job is currently on. Used when the job is
    /// interrupted from outside its own step flow.
    pub fn abort(&mut self, error: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        let current = self.current_step();
        if current < self.steps.len() {
            self.fail(current, error)
        } else {
            self.finish(JobState::Failed, None, Some(error.into()));
            Ok(())
        }
    }

    /// True when no step is past a step that has not completed, and at
    /// most one step is in progress.
    pub fn steps_are_monotonic(&self) -> bool {
        let mut blocked = false;
        let mut in_progress = 0;
        for step in &self.steps {
            if step.status == StepStatus::InProgress {
                in_progress += 1;
            }
            if blocked && step.status != StepStatus::Pending {
                return false;
            }
            if step.status != StepStatus::Completed {
                blocked = true;
            }
        }
        in_progress <= 1
    }

    fn finish(&mut self, state: JobState, result: Option<DocumentRecord>, error: Option<String>) {
        self.state = state;
        self.result = result;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_terminal() {
            return Err(DocketError::JobTerminal(self.id.to_string()));
        }
        Ok(())
    }

    fn ensure_step(&self, step: usize) -> Result<()> {
        if step >= self.steps.len() {
            return Err(DocketError::NotFound(format!(
                "step {step} in job {} ({} steps)",
                self.id,
                self.steps.len()
            )));
        }
        Ok(())
    }

    fn ensure_earlier_completed(&self, step: usize) -> Result<()> {
        match self.steps[..step].iter().find(|s| s.status != StepStatus::Completed) {
            Some(blocking) => Err(DocketError::StepOrder {
                step: self.steps[step].label.clone(),
                blocking: blocking.label.clone(),
            }),
            None => Ok(()),
        }
    }

    fn ensure_later_pending(&self, step: usize) -> Result<()> {
        match self.steps[step + 1..].iter().find(|s| s.status != StepStatus::Pending) {
            Some(later) => Err(DocketError::StepOrder {
                step: later.label.clone(),
                blocking: self.steps[step].label.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::DOCUMENT_PIPELINE;

    fn record() -> DocumentRecord {
        DocumentRecord {
            file: "paper.pdf".into(),
            session_id: None,
            title: Some("A Paper".into()),
            authors: vec![],
            reference_count: 0,
            content_length: 10,
            parsed_at: Utc::now(),
        }
    }

    fn statuses(job: &ProcessingJob) -> Vec<StepStatus> {
        job.steps().iter().map(|s| s.status).collect()
    }

    #[test]
    fn test_new_job_is_all_pending() {
        let job = ProcessingJob::document("paper.pdf", None);
        assert_eq!(job.steps().len(), DOCUMENT_PIPELINE.len());
        assert!(job.steps().iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(job.state(), JobState::Queued);
        assert_eq!(job.current_step(), 0);
    }

    #[test]
    fn test_custom_step_list() {
        let mut job = ProcessingJob::new("a.txt", None, ["fetch", "store"]);
        assert_eq!(job.steps().len(), 2);
        job.advance(0, StepStatus::InProgress).unwrap();
        job.advance(0, StepStatus::Completed).unwrap();
        job.advance(1, StepStatus::Completed).unwrap();
        job.succeed(record()).unwrap();
        assert_eq!(job.state(), JobState::Succeeded);
        assert_eq!(job.current_step(), 2);
    }

    #[test]
    fn test_advance_in_order() {
        let mut job = ProcessingJob::document("paper.pdf", None);
        for step in 0..job.steps().len() {
            job.advance(step, StepStatus::InProgress).unwrap();
            assert_eq!(job.state(), JobState::Running);
            job.advance(step, StepStatus::Completed).unwrap();
            assert!(job.steps_are_monotonic());
        }
        job.succeed(record()).unwrap();
        assert!(job.is_terminal());
        assert!(job.result().is_some());
    }

    #[test]
    fn test_complete_out_of_order_rejected() {
        let mut job = ProcessingJob::document("paper.pdf", None);
        let err = job.advance(2, StepStatus::Completed).unwrap_err();
        match err {
            DocketError::StepOrder { step, blocking } => {
                assert_eq!(step, "Parse document");
                assert_eq!(blocking, "Read source");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(job.steps().iter().all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn test_two_steps_in_progress_rejected() {
        let mut job = ProcessingJob::document("paper.pdf", None);
        job.advance(0, StepStatus::InProgress).unwrap();
        assert!(job.advance(1, StepStatus::InProgress).is_err());
    }

    #[test]
    fn test_reopening_earlier_step_rejected() {
        let mut job = ProcessingJob::document("paper.pdf", None);
        job.advance(0, StepStatus::Completed).unwrap();
        job.advance(1, StepStatus::InProgress).unwrap();
        assert!(job.advance(0, StepStatus::Pending).is_err());
        assert!(job.advance(0, StepStatus::InProgress).is_err());
        assert!(job.steps_are_monotonic());
    }

    #[test]
    fn test_fail_leaves_later_steps_pending() {
        let mut job = ProcessingJob::document("paper.pdf", None);
        job.advance(0, StepStatus::Completed).unwrap();
        job.advance(1, StepStatus::Completed).unwrap();
        job.advance(2, StepStatus::InProgress).unwrap();
        job.fail(2, "parser unreachable").unwrap();

        assert_eq!(
            statuses(&job),
            vec![
                StepStatus::Completed,
                StepStatus::Completed,
                StepStatus::Failed,
                StepStatus::Pending,
                StepStatus::Pending,
            ]
        );
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.error(), Some("parser unreachable"));
        assert_eq!(job.failed_step().map(|s| s.label.as_str()), Some("Parse document"));
        assert!(job.finished_at().is_some());
    }

    #[test]
    fn test_terminal_job_is_immutable() {
        let mut job = ProcessingJob::document("paper.pdf", None);
        job.fail(0, "missing").unwrap();
        assert!(matches!(job.advance(0, StepStatus::Completed), Err(DocketError::JobTerminal(_))));
        assert!(matches!(job.reset(), Err(DocketError::JobTerminal(_))));
        assert!(matches!(job.fail(0, "again"), Err(DocketError::JobTerminal(_))));
        assert_eq!(job.error(), Some("missing"));
    }

    #[test]
    fn test_advance_failed_status_fails_job() {
        let mut job = ProcessingJob::document("paper.pdf", None);
        job.advance(0, StepStatus::Failed).unwrap();
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.error(), Some("Read source failed"));
    }

    #[test]
    fn test_succeed_requires_all_steps() {
        let mut job = ProcessingJob::document("paper.pdf", None);
        job.advance(0, StepStatus::Completed).unwrap();
        assert!(job.succeed(record()).is_err());
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_abort_fails_current_step() {
        let mut job = ProcessingJob::document("paper.pdf", None);
        job.advance(0, StepStatus::Completed).unwrap();
        job.advance(1, StepStatus::InProgress).unwrap();
        job.abort("interrupted").unwrap();
        assert_eq!(job.failed_step().map(|s| s.order), Some(1));
        assert!(job.steps_are_monotonic());
    }

    #[test]
    fn test_unknown_step_rejected() {
        let mut job = ProcessingJob::document("paper.pdf", None);
        assert!(matches!(job.advance(9, StepStatus::InProgress), Err(DocketError::NotFound(_))));
    }

    #[test]
    fn test_reset_returns_to_pending() {
        let mut job = ProcessingJob::document("paper.pdf", None);
        job.advance(0, StepStatus::Completed).unwrap();
        job.reset().unwrap();
        assert!(job.steps().iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(job.step_index("Persist result"), Some(4));
    }
}
