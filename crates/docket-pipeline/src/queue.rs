use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use docket_core::api_types::BatchProgress;
use docket_core::job::ProcessingJob;

/// Executes one dequeued job. Failures are recorded on the job itself.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &mut ProcessingJob);

    /// Receives every job that left the queue and was not discarded,
    /// in dequeue order.
    async fn complete(&self, job: ProcessingJob);
}

struct QueueState {
    pending: VecDeque<ProcessingJob>,
    discarded: HashSet<Uuid>,
    total: usize,
    completed: usize,
    current: Option<(Uuid, String)>,
    draining: bool,
}

impl QueueState {
    fn progress(&self) -> BatchProgress {
        BatchProgress {
            total: self.total,
            completed: self.completed,
            pending: self.pending.len(),
            current: self.current.as_ref().map(|(_, file)| file.clone()),
            running: self.draining,
        }
    }
}

/// FIFO queue of jobs drained by at most one task at a time.
///
/// `enqueue` is always accepted immediately. The first call starts a
/// drain task; calls made while it runs only grow the queue and the
/// `total` counter, and the running drain picks the new jobs up.
#[derive(Clone)]
pub struct BatchQueue {
    state: Arc<Mutex<QueueState>>,
    processor: Arc<dyn JobProcessor>,
    progress: Arc<watch::Sender<BatchProgress>>,
}

impl BatchQueue {
    pub fn new(processor: Arc<dyn JobProcessor>) -> Self {
        let (progress, _) = watch::channel(BatchProgress::default());
        Self {
            state: Arc::new(Mutex::new(QueueState {
                pending: VecDeque::new(),
                discarded: HashSet::new(),
                total: 0,
                completed: 0,
                current: None,
                draining: false,
            })),
            processor,
            progress: Arc::new(progress),
        }
    }

    /// Append jobs to the tail. Starts a drain if none is running.
    /// Must be called within a tokio runtime.
    pub fn enqueue(&self, jobs: Vec<ProcessingJob>) -> BatchProgress {
        let count = jobs.len();
        let (start_drain, progress) = {
            let mut state = self.lock();
            state.pending.extend(jobs);
            state.total += count;
            let start_drain = !state.draining && !state.pending.is_empty();
            if start_drain {
                state.draining = true;
            }
            (start_drain, self.publish(&state))
        };

        if start_drain {
            info!(jobs = count, total = progress.total, "Starting batch drain");
            tokio::spawn(drain(self.clone()));
        } else {
            debug!(jobs = count, total = progress.total, "Jobs absorbed into running drain");
        }
        progress
    }

    /// Stop a queued or running job from producing a result. A queued
    /// job is skipped when it reaches the head; a running job finishes
    /// but is not handed to [`JobProcessor::complete`].
    pub fn discard(&self, job_id: Uuid) -> bool {
        let mut state = self.lock();
        let known = state.pending.iter().any(|j| j.id == job_id)
            || state.current.as_ref().is_some_and(|(id, _)| *id == job_id);
        if known {
            state.discarded.insert(job_id);
        }
        known
    }

    pub fn progress(&self) -> BatchProgress {
        self.lock().progress()
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.progress.subscribe()
    }

    /// Wait until the queue has no drain running.
    pub async fn wait_idle(&self) -> BatchProgress {
        let mut rx = self.progress.subscribe();
        let idle = rx.wait_for(|p| !p.running).await.map(|p| p.clone());
        idle.unwrap_or_else(|_| self.progress())
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &QueueState) -> BatchProgress {
        let progress = state.progress();
        self.progress.send_replace(progress.clone());
        progress
    }
}

async fn drain(queue: BatchQueue) {
    loop {
        let next = {
            let mut state = queue.lock();
            match state.pending.pop_front() {
                Some(job) => {
                    let skip = state.discarded.contains(&job.id);
                    state.current = Some((job.id, job.file.clone()));
                    queue.publish(&state);
                    Some((job, skip))
                }
                None => {
                    state.draining = false;
                    state.current = None;
                    let progress = queue.publish(&state);
                    info!(
                        total = progress.total,
                        completed = progress.completed,
                        "Batch drain finished"
                    );
                    None
                }
            }
        };

        let Some((mut job, skip)) = next else {
            return;
        };

        if skip {
            debug!(job_id = %job.id, file = %job.file, "Skipping discarded job");
        } else {
            let run = AssertUnwindSafe(queue.processor.process(&mut job))
                .catch_unwind()
                .await;
            if run.is_err() {
                error!(job_id = %job.id, file = %job.file, "Job processor panicked");
                if !job.is_terminal() {
                    let _ = job.abort("job processor panicked");
                }
            }
        }

        let deliver = !skip && !queue.lock().discarded.contains(&job.id);
        if deliver {
            queue.processor.complete(job).await;
        } else {
            debug!(job_id = %job.id, "Dropping result of discarded job");
        }

        let mut state = queue.lock();
        state.completed += 1;
        state.total = state.total.max(state.completed + state.pending.len());
        state.current = None;
        queue.publish(&state);
    }
}
