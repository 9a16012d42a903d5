use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use docket_core::config::ExtractionConfig;
use docket_core::error::{DocketError, Result};
use docket_core::extraction::{
    ExtractionRequest, ExtractionService, SessionOutcome, SessionPhase, SessionSnapshot,
    TerminalResult,
};
use docket_core::strategy::ChunkingStrategy;

use crate::interpreter::{ExtractionInterpreter, Interpretation};
use crate::protocol;

/// Starts extraction sessions and enforces one active session per
/// document.
#[derive(Clone)]
pub struct ExtractionSessionController {
    service: Arc<dyn ExtractionService>,
    config: ExtractionConfig,
    active: Arc<Mutex<HashSet<String>>>,
}

impl ExtractionSessionController {
    pub fn new(service: Arc<dyn ExtractionService>, config: ExtractionConfig) -> Self {
        Self {
            service,
            config,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Open a streaming session for `document_id`.
    ///
    /// Fails with [`DocketError::SessionActive`] if that document already
    /// has a session in flight. Must be called within a tokio runtime.
    pub fn start(&self, document_id: &str, strategy: ChunkingStrategy) -> Result<ExtractionSession> {
        let slot = ActiveSlot::claim(&self.active, document_id)?;
        let shared = Arc::new(RwLock::new(SessionState::new(document_id, strategy)));
        let request = ExtractionRequest {
            document_id: document_id.to_string(),
            chunking_strategy: strategy,
        };

        info!(document_id, strategy = %strategy, "Starting extraction session");

        let task = tokio::spawn(drive(
            self.service.clone(),
            self.config.clone(),
            request,
            shared.clone(),
            slot,
        ));

        Ok(ExtractionSession { shared, task })
    }

    pub fn is_active(&self, document_id: &str) -> bool {
        lock_set(&self.active).contains(document_id)
    }
}

/// Handle to one running session. Dropping it does not stop the session;
/// call [`ExtractionSession::abort`] for that.
pub struct ExtractionSession {
    shared: Arc<RwLock<SessionState>>,
    task: JoinHandle<SessionOutcome>,
}

impl ExtractionSession {
    pub fn observer(&self) -> SessionObserver {
        SessionObserver {
            shared: self.shared.clone(),
        }
    }

    /// Stop the session. Nothing it produces afterwards is applied.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn abort_handle(&self) -> tokio::task::AbortHandle {
        self.task.abort_handle()
    }

    /// Wait for the terminal outcome.
    pub async fn wait(self) -> SessionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = if e.is_cancelled() {
                    "session cancelled".to_string()
                } else {
                    format!("session task failed: {e}")
                };
                let mut state = self.shared.write().await;
                state.resolve(SessionOutcome::Failed { message });
                state.outcome.clone()
            }
        }
    }
}

/// Read-only view of a session that outlives the handle.
#[derive(Clone)]
pub struct SessionObserver {
    shared: Arc<RwLock<SessionState>>,
}

impl SessionObserver {
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.shared.read().await.snapshot()
    }
}

struct SessionState {
    strategy: ChunkingStrategy,
    interpreter: ExtractionInterpreter,
    phase: SessionPhase,
    fallback_used: bool,
    outcome: SessionOutcome,
}

impl SessionState {
    fn new(document_id: &str, strategy: ChunkingStrategy) -> Self {
        Self {
            strategy,
            interpreter: ExtractionInterpreter::new(document_id),
            phase: SessionPhase::Streaming,
            fallback_used: false,
            outcome: SessionOutcome::Pending,
        }
    }

    /// Record the terminal outcome. Only the first call has any effect.
    fn resolve(&mut self, outcome: SessionOutcome) -> bool {
        if self.outcome.is_terminal() {
            warn!(
                document_id = %self.interpreter.document_id(),
                "Ignoring second terminal outcome for session"
            );
            return false;
        }
        self.outcome = outcome;
        self.phase = SessionPhase::Terminal;
        true
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            document_id: self.interpreter.document_id().to_string(),
            strategy: self.strategy,
            phase: self.phase,
            transcript: self.interpreter.transcript().to_string(),
            progress: self.interpreter.progress().clone(),
            last_status: self.interpreter.last_status().map(str::to_string),
            events: self.interpreter.events().to_vec(),
            anomalies: self.interpreter.anomalies(),
            fallback_used: self.fallback_used,
            outcome: self.outcome.clone(),
        }
    }
}

/// Session lifecycle. A stream failure can only be entered from
/// `Streaming`, so the fallback runs at most once.
enum Lifecycle {
    Streaming,
    StreamFailed(DocketError),
    Terminal(SessionOutcome),
}

async fn drive(
    service: Arc<dyn ExtractionService>,
    config: ExtractionConfig,
    request: ExtractionRequest,
    shared: Arc<RwLock<SessionState>>,
    _slot: ActiveSlot,
) -> SessionOutcome {
    let mut lifecycle = Lifecycle::Streaming;

    let outcome = loop {
        lifecycle = match lifecycle {
            Lifecycle::Streaming => match consume_stream(&*service, &config, &request, &shared).await {
                Ok(result) => Lifecycle::Terminal(outcome_from(result)),
                Err(e) => Lifecycle::StreamFailed(e),
            },
            Lifecycle::StreamFailed(cause) => {
                warn!(
                    document_id = %request.document_id,
                    error = %cause,
                    "Extraction stream failed before a terminal event, falling back to synchronous call"
                );
                {
                    let mut state = shared.write().await;
                    state.phase = SessionPhase::Fallback;
                    state.fallback_used = true;
                }
                Lifecycle::Terminal(run_fallback(&*service, &config, &request, &cause).await)
            }
            Lifecycle::Terminal(outcome) => break outcome,
        };
    };

    match &outcome {
        SessionOutcome::Succeeded {
            entity_count,
            relationship_count,
            ..
        } => info!(
            document_id = %request.document_id,
            entities = entity_count,
            relationships = relationship_count,
            "Extraction session succeeded"
        ),
        SessionOutcome::Failed { message } => error!(
            document_id = %request.document_id,
            error = %message,
            "Extraction session failed"
        ),
        SessionOutcome::Pending => {}
    }

    let mut state = shared.write().await;
    state.resolve(outcome);
    state.outcome.clone()
}

/// Route every inbound message to the interpreter until it reports a
/// terminal event. Any channel error, idle timeout or early close is a
/// stream failure.
async fn consume_stream(
    service: &dyn ExtractionService,
    config: &ExtractionConfig,
    request: &ExtractionRequest,
    shared: &RwLock<SessionState>,
) -> Result<TerminalResult> {
    let mut stream = service
        .open_stream(request)
        .await
        .map_err(|e| DocketError::Stream(format!("failed to open channel: {e}")))?;

    loop {
        let next = match config.stream_idle_timeout {
            Some(idle) => tokio::time::timeout(idle, stream.next()).await.map_err(|_| {
                DocketError::Stream(format!("no event received for {}s", idle.as_secs()))
            })?,
            None => stream.next().await,
        };

        match next {
            Some(Ok(raw)) => {
                let mut state = shared.write().await;
                if let Interpretation::Terminal(result) = state.interpreter.apply_raw(&raw) {
                    return Ok(result);
                }
            }
            Some(Err(e)) => return Err(DocketError::Stream(e.to_string())),
            None => {
                return Err(DocketError::Stream(
                    "channel closed before a terminal event".into(),
                ))
            }
        }
    }
}

async fn run_fallback(
    service: &dyn ExtractionService,
    config: &ExtractionConfig,
    request: &ExtractionRequest,
    cause: &DocketError,
) -> SessionOutcome {
    let body = match tokio::time::timeout(config.fallback_timeout, service.extract(request)).await {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => {
            return SessionOutcome::Failed {
                message: format!("{cause}; fallback failed: {e}"),
            }
        }
        Err(_) => {
            return SessionOutcome::Failed {
                message: format!(
                    "{cause}; fallback timed out after {:?}",
                    config.fallback_timeout
                ),
            }
        }
    };

    match protocol::decode_fallback(&body) {
        Ok(result) => outcome_from(result),
        Err(e) => SessionOutcome::Failed {
            message: format!("{cause}; fallback response unreadable: {e}"),
        },
    }
}

fn outcome_from(result: TerminalResult) -> SessionOutcome {
    match result {
        TerminalResult::Succeeded(summary) => SessionOutcome::Succeeded {
            entity_count: summary.entity_count,
            relationship_count: summary.relationship_count,
            transcript: summary.transcript.unwrap_or_default(),
        },
        TerminalResult::Failed { message } => SessionOutcome::Failed { message },
    }
}

/// Claim on the per-document active slot, released when dropped.
struct ActiveSlot {
    document_id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl ActiveSlot {
    fn claim(active: &Arc<Mutex<HashSet<String>>>, document_id: &str) -> Result<Self> {
        if !lock_set(active).insert(document_id.to_string()) {
            warn!(document_id, "Rejecting second extraction session for document");
            return Err(DocketError::SessionActive(document_id.to_string()));
        }
        Ok(Self {
            document_id: document_id.to_string(),
            active: active.clone(),
        })
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        lock_set(&self.active).remove(&self.document_id);
    }
}

fn lock_set(set: &Mutex<HashSet<String>>) -> std::sync::MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
