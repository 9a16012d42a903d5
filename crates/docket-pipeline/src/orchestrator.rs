use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use docket_core::api_types::{BatchProgress, BatchSummary, ExtractionRecord, JobRecord};
use docket_core::{
    ChunkingStrategy, DocumentParser, DocumentSource, ExtractionConfig, ExtractionService,
    PipelineConfig, ProcessingJob, ResultStore, SessionOutcome, SessionSnapshot,
};
use docket_extraction::{ExtractionSessionController, SessionObserver};

use crate::pipeline::DocumentPipeline;
use crate::queue::{BatchQueue, JobProcessor};

/// Entry point tying the document pipeline, the batch queue and the
/// extraction session controller together.
#[derive(Clone)]
pub struct Orchestrator {
    pipeline: Arc<DocumentPipeline>,
    sessions: ExtractionSessionController,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        parser: Arc<dyn DocumentParser>,
        store: Arc<dyn ResultStore>,
        extraction: Arc<dyn ExtractionService>,
        pipeline: PipelineConfig,
        sessions: ExtractionConfig,
    ) -> Self {
        Self {
            pipeline: Arc::new(DocumentPipeline::new(source, parser, store, pipeline)),
            sessions: ExtractionSessionController::new(extraction, sessions),
        }
    }

    pub fn sessions(&self) -> &ExtractionSessionController {
        &self.sessions
    }

    /// Create an empty batch. Files added with [`BatchRun::enqueue`] are
    /// processed in order.
    pub fn batch(&self, session_id: Option<String>) -> BatchRun {
        let records = Arc::new(RwLock::new(Vec::new()));
        let processor = BatchProcessor {
            pipeline: self.pipeline.clone(),
            records: records.clone(),
        };
        let run = BatchRun {
            id: Uuid::new_v4(),
            session_id,
            queue: BatchQueue::new(Arc::new(processor)),
            records,
        };
        info!(batch_id = %run.id, "Batch run created");
        run
    }

    /// Queue one job per file and start processing them in order.
    pub fn run_batch(&self, files: Vec<String>, session_id: Option<String>) -> BatchRun {
        let run = self.batch(session_id);
        run.enqueue(files);
        run
    }

    /// Run extraction sessions for the documents one after another.
    pub fn run_extraction(
        &self,
        document_ids: Vec<String>,
        strategy: ChunkingStrategy,
    ) -> ExtractionRun {
        let (done, _) = watch::channel(false);
        let run = ExtractionRun {
            id: Uuid::new_v4(),
            strategy,
            documents: document_ids.clone(),
            inner: Arc::new(ExtractionRunState {
                records: RwLock::new(Vec::new()),
                removed: Mutex::new(HashSet::new()),
                active: Mutex::new(None),
                done,
            }),
        };
        info!(
            run_id = %run.id,
            documents = document_ids.len(),
            strategy = %strategy,
            "Extraction run created"
        );
        tokio::spawn(run_sessions(
            self.sessions.clone(),
            document_ids,
            strategy,
            run.inner.clone(),
        ));
        run
    }
}

struct BatchProcessor {
    pipeline: Arc<DocumentPipeline>,
    records: Arc<RwLock<Vec<JobRecord>>>,
}

#[async_trait]
impl JobProcessor for BatchProcessor {
    async fn process(&self, job: &mut ProcessingJob) {
        self.pipeline.run(job).await;
    }

    async fn complete(&self, job: ProcessingJob) {
        self.records.write().await.push(JobRecord::from(&job));
    }
}

/// Handle to one batch queue and its append-only result log.
#[derive(Clone)]
pub struct BatchRun {
    id: Uuid,
    session_id: Option<String>,
    queue: BatchQueue,
    records: Arc<RwLock<Vec<JobRecord>>>,
}

impl BatchRun {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Add files to the tail of the queue, returning the new job ids.
    pub fn enqueue(&self, files: Vec<String>) -> Vec<Uuid> {
        let jobs: Vec<ProcessingJob> = files
            .into_iter()
            .map(|file| ProcessingJob::document(file, self.session_id.clone()))
            .collect();
        let ids = jobs.iter().map(|j| j.id).collect();
        self.queue.enqueue(jobs);
        ids
    }

    /// Drop a job from caller-facing state. It still counts as completed.
    pub fn discard(&self, job_id: Uuid) -> bool {
        let discarded = self.queue.discard(job_id);
        if discarded {
            info!(batch_id = %self.id, job_id = %job_id, "Job discarded");
        }
        discarded
    }

    pub fn progress(&self) -> BatchProgress {
        self.queue.progress()
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.queue.subscribe()
    }

    pub async fn records(&self) -> Vec<JobRecord> {
        self.records.read().await.clone()
    }

    /// Wait for the queue to drain and summarize the results.
    pub async fn wait(&self) -> BatchSummary {
        let progress = self.queue.wait_idle().await;
        BatchSummary::new(&progress, self.records().await)
    }
}

struct ActiveSession {
    document_id: String,
    observer: SessionObserver,
    abort: tokio::task::AbortHandle,
}

struct ExtractionRunState {
    records: RwLock<Vec<ExtractionRecord>>,
    removed: Mutex<HashSet<String>>,
    active: Mutex<Option<ActiveSession>>,
    done: watch::Sender<bool>,
}

impl ExtractionRunState {
    fn is_removed(&self, document_id: &str) -> bool {
        lock(&self.removed).contains(document_id)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to a sequential extraction run over a list of documents.
#[derive(Clone)]
pub struct ExtractionRun {
    id: Uuid,
    strategy: ChunkingStrategy,
    documents: Vec<String>,
    inner: Arc<ExtractionRunState>,
}

impl ExtractionRun {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn strategy(&self) -> ChunkingStrategy {
        self.strategy
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    /// Remove a document from the run. An active session for it is
    /// aborted and its result is never recorded; a queued one is skipped.
    pub fn remove(&self, document_id: &str) -> bool {
        let newly_removed = lock(&self.inner.removed).insert(document_id.to_string());
        if let Some(active) = lock(&self.inner.active).as_ref() {
            if active.document_id == document_id {
                info!(run_id = %self.id, document_id, "Aborting active extraction session");
                active.abort.abort();
            }
        }
        newly_removed
    }

    /// Snapshot of the session currently streaming, if any.
    pub async fn active(&self) -> Option<SessionSnapshot> {
        let observer = lock(&self.inner.active).as_ref().map(|a| a.observer.clone());
        match observer {
            Some(observer) => Some(observer.snapshot().await),
            None => None,
        }
    }

    pub async fn records(&self) -> Vec<ExtractionRecord> {
        self.inner.records.read().await.clone()
    }

    pub fn is_finished(&self) -> bool {
        *self.inner.done.borrow()
    }

    /// Wait until every document has been handled.
    pub async fn wait(&self) -> Vec<ExtractionRecord> {
        let mut rx = self.inner.done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
        self.records().await
    }
}

async fn run_sessions(
    controller: ExtractionSessionController,
    document_ids: Vec<String>,
    strategy: ChunkingStrategy,
    run: Arc<ExtractionRunState>,
) {
    for document_id in document_ids {
        if run.is_removed(&document_id) {
            debug!(document_id = %document_id, "Skipping removed document");
            continue;
        }

        let session = match controller.start(&document_id, strategy) {
            Ok(session) => session,
            Err(e) => {
                warn!(document_id = %document_id, error = %e, "Could not start extraction session");
                let outcome = SessionOutcome::Failed {
                    message: e.to_string(),
                };
                run.records
                    .write()
                    .await
                    .push(ExtractionRecord::new(&document_id, strategy, &outcome, false));
                continue;
            }
        };

        let observer = session.observer();
        *lock(&run.active) = Some(ActiveSession {
            document_id: document_id.clone(),
            observer: observer.clone(),
            abort: session.abort_handle(),
        });
        if run.is_removed(&document_id) {
            session.abort();
        }

        let outcome = session.wait().await;
        let fallback_used = observer.snapshot().await.fallback_used;
        *lock(&run.active) = None;

        if run.is_removed(&document_id) {
            info!(document_id = %document_id, "Dropping result of removed document");
            continue;
        }

        run.records.write().await.push(ExtractionRecord::new(
            &document_id,
            strategy,
            &outcome,
            fallback_used,
        ));
    }

    run.done.send_replace(true);
    info!("Extraction run finished");
}
