use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{debug, warn};

use docket_core::extraction::{
    ChunkProgress, ExtractionEvent, LoggedEvent, TerminalResult,
};

use crate::protocol;

/// What applying one event did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    Applied,
    /// Malformed, out of order, or after the terminal event.
    Skipped,
    Terminal(TerminalResult),
}

/// State machine over the event stream of one extraction session.
///
/// Accumulates the token transcript in arrival order, tracks chunk
/// progress and keeps a timestamped log of every accepted event. Only
/// `extraction_complete` and `error` end the session; anything that
/// arrives afterwards is ignored.
#[derive(Debug)]
pub struct ExtractionInterpreter {
    document_id: String,
    transcript: String,
    events: Vec<LoggedEvent>,
    progress: ChunkProgress,
    started: BTreeSet<u32>,
    finished: BTreeSet<u32>,
    chunking_seen: bool,
    chunk_events_seen: bool,
    generating: bool,
    last_status: Option<String>,
    anomalies: u64,
    terminal: Option<TerminalResult>,
}

impl ExtractionInterpreter {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            transcript: String::new(),
            events: Vec::new(),
            progress: ChunkProgress::default(),
            started: BTreeSet::new(),
            finished: BTreeSet::new(),
            chunking_seen: false,
            chunk_events_seen: false,
            generating: false,
            last_status: None,
            anomalies: 0,
            terminal: None,
        }
    }

    /// Decode and apply one raw message. Undecodable messages are logged
    /// and skipped.
    pub fn apply_raw(&mut self, raw: &str) -> Interpretation {
        if self.terminal.is_some() {
            debug!(document_id = %self.document_id, "Ignoring message after terminal event");
            return Interpretation::Skipped;
        }
        match protocol::decode_event(raw) {
            Ok(event) => self.apply(event),
            Err(e) => {
                self.anomaly(&e.to_string());
                Interpretation::Skipped
            }
        }
    }

    pub fn apply(&mut self, event: ExtractionEvent) -> Interpretation {
        if self.terminal.is_some() {
            debug!(
                document_id = %self.document_id,
                kind = event.kind(),
                "Ignoring event after terminal event"
            );
            return Interpretation::Skipped;
        }

        let accepted = match &event {
            ExtractionEvent::Status { message } => {
                self.last_status = Some(message.clone());
                true
            }
            ExtractionEvent::DocumentInfo { .. } => true,
            ExtractionEvent::ChunkingComplete { total_chunks } => {
                if self.chunking_seen || self.chunk_events_seen {
                    self.anomaly("chunking_complete repeated or after chunk events");
                    false
                } else {
                    self.chunking_seen = true;
                    self.progress.total = Some(*total_chunks);
                    true
                }
            }
            ExtractionEvent::ChunkStart { index } => {
                self.chunk_events_seen = true;
                if self.started.insert(*index) {
                    self.progress.started += 1;
                    self.progress.current = Some(*index);
                    true
                } else {
                    self.anomaly(&format!("chunk_start({index}) repeated"));
                    false
                }
            }
            ExtractionEvent::ChunkComplete { index } | ExtractionEvent::ChunkError { index, .. } => {
                self.chunk_events_seen = true;
                if !self.started.contains(index) || !self.finished.insert(*index) {
                    self.anomaly(&format!("{}({index}) without an open chunk_start", event.kind()));
                    false
                } else {
                    if matches!(event, ExtractionEvent::ChunkComplete { .. }) {
                        self.progress.completed += 1;
                    } else {
                        self.progress.failed += 1;
                    }
                    if self.progress.current == Some(*index) {
                        self.progress.current = None;
                    }
                    true
                }
            }
            ExtractionEvent::LlmStart => {
                if self.generating {
                    self.anomaly("llm_start while generation is already open");
                    false
                } else {
                    self.generating = true;
                    true
                }
            }
            ExtractionEvent::LlmToken { text } => {
                if self.generating {
                    self.transcript.push_str(text);
                    true
                } else {
                    self.anomaly("llm_token outside a generation phase");
                    false
                }
            }
            ExtractionEvent::LlmComplete | ExtractionEvent::LlmError { .. } => {
                if self.generating {
                    self.generating = false;
                    true
                } else {
                    self.anomaly(&format!("{} without llm_start", event.kind()));
                    false
                }
            }
            ExtractionEvent::ExtractionComplete(_) | ExtractionEvent::Error { .. } => true,
        };

        if !accepted {
            return Interpretation::Skipped;
        }

        debug!(document_id = %self.document_id, kind = event.kind(), "Applied extraction event");

        let terminal = match &event {
            ExtractionEvent::ExtractionComplete(summary) => {
                let mut summary = summary.clone();
                if summary.transcript.is_none() {
                    summary.transcript = Some(self.transcript.clone());
                }
                Some(TerminalResult::Succeeded(summary))
            }
            ExtractionEvent::Error { message } => Some(TerminalResult::Failed {
                message: message.clone(),
            }),
            _ => None,
        };

        self.events.push(LoggedEvent {
            received_at: Utc::now(),
            event,
        });

        match terminal {
            Some(result) => {
                self.terminal = Some(result.clone());
                Interpretation::Terminal(result)
            }
            None => Interpretation::Applied,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn events(&self) -> &[LoggedEvent] {
        &self.events
    }

    pub fn progress(&self) -> &ChunkProgress {
        &self.progress
    }

    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }

    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    pub fn terminal(&self) -> Option<&TerminalResult> {
        self.terminal.as_ref()
    }

    fn anomaly(&mut self, reason: &str) {
        self.anomalies += 1;
        warn!(document_id = %self.document_id, reason, "Skipping extraction protocol anomaly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_core::extraction::ExtractionSummary;

    fn token(text: &str) -> ExtractionEvent {
        ExtractionEvent::LlmToken { text: text.into() }
    }

    #[test]
    fn test_tokens_concatenate_in_order() {
        let mut it = ExtractionInterpreter::new("doc-1");
        it.apply(ExtractionEvent::LlmStart);
        for t in ["A", "B", "C"] {
            assert_eq!(it.apply(token(t)), Interpretation::Applied);
        }
        assert_eq!(it.transcript(), "ABC");
    }

    #[test]
    fn test_duplicate_tokens_are_kept() {
        let mut it = ExtractionInterpreter::new("doc-1");
        it.apply(ExtractionEvent::LlmStart);
        it.apply(token("ha"));
        it.apply(token("ha"));
        assert_eq!(it.transcript(), "haha");
    }

    #[test]
    fn test_tokens_across_generation_phases() {
        let mut it = ExtractionInterpreter::new("doc-1");
        it.apply(ExtractionEvent::LlmStart);
        it.apply(token("one "));
        it.apply(ExtractionEvent::LlmComplete);
        it.apply(ExtractionEvent::LlmStart);
        it.apply(token("two"));
        it.apply(ExtractionEvent::LlmError {
            message: "cut off".into(),
        });
        assert_eq!(it.transcript(), "one two");
    }

    #[test]
    fn test_token_outside_generation_skipped() {
        let mut it = ExtractionInterpreter::new("doc-1");
        assert_eq!(it.apply(token("early")), Interpretation::Skipped);
        it.apply(ExtractionEvent::LlmStart);
        it.apply(token("x"));
        it.apply(ExtractionEvent::LlmComplete);
        assert_eq!(it.apply(token("late")), Interpretation::Skipped);
        assert_eq!(it.transcript(), "x");
        assert_eq!(it.anomalies(), 2);
    }

    #[test]
    fn test_duplicate_terminal_ignored() {
        let mut it = ExtractionInterpreter::new("doc-1");
        let first = ExtractionEvent::ExtractionComplete(ExtractionSummary {
            entity_count: 5,
            relationship_count: 3,
            transcript: None,
        });
        let second = ExtractionEvent::ExtractionComplete(ExtractionSummary {
            entity_count: 50,
            relationship_count: 30,
            transcript: None,
        });
        assert!(matches!(it.apply(first), Interpretation::Terminal(_)));
        assert_eq!(it.apply(second), Interpretation::Skipped);
        assert_eq!(
            it.terminal(),
            Some(&TerminalResult::Succeeded(ExtractionSummary {
                entity_count: 5,
                relationship_count: 3,
                transcript: Some(String::new()),
            }))
        );
    }

    #[test]
    fn test_nothing_applies_after_error() {
        let mut it = ExtractionInterpreter::new("doc-1");
        it.apply(ExtractionEvent::LlmStart);
        it.apply(token("a"));
        let result = it.apply(ExtractionEvent::Error {
            message: "boom".into(),
        });
        assert_eq!(
            result,
            Interpretation::Terminal(TerminalResult::Failed {
                message: "boom".into()
            })
        );
        assert_eq!(it.apply(token("b")), Interpretation::Skipped);
        assert_eq!(it.apply_raw(r#"{"type": "extraction_complete", "entity_count": 1}"#), Interpretation::Skipped);
        assert_eq!(it.transcript(), "a");
    }

    #[test]
    fn test_complete_uses_accumulated_transcript() {
        let mut it = ExtractionInterpreter::new("doc-1");
        it.apply_raw(r#"{"type": "llm_start"}"#);
        it.apply_raw(r#"{"type": "llm_token", "token": "{\"entities\""}"#);
        it.apply_raw(r#"{"type": "llm_token", "token": ": []}"}"#);
        it.apply_raw(r#"{"type": "llm_complete"}"#);
        let result = it.apply_raw(r#"{"type": "extraction_complete", "entity_count": 0, "relationship_count": 0}"#);
        match result {
            Interpretation::Terminal(TerminalResult::Succeeded(summary)) => {
                assert_eq!(summary.transcript.as_deref(), Some("{\"entities\": []}"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_event_transcript_wins_over_accumulated() {
        let mut it = ExtractionInterpreter::new("doc-1");
        it.apply(ExtractionEvent::LlmStart);
        it.apply(token("partial"));
        let result = it.apply_raw(
            r#"{"type": "extraction_complete", "entity_count": 2, "relationship_count": 1, "transcript": "full"}"#,
        );
        match result {
            Interpretation::Terminal(TerminalResult::Succeeded(summary)) => {
                assert_eq!(summary.transcript.as_deref(), Some("full"));
                assert_eq!(summary.entity_count, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_malformed_messages_skipped() {
        let mut it = ExtractionInterpreter::new("doc-1");
        assert_eq!(it.apply_raw("{not json"), Interpretation::Skipped);
        assert_eq!(it.apply_raw(r#"{"type": "heartbeat"}"#), Interpretation::Skipped);
        assert_eq!(it.anomalies(), 2);
        assert!(it.terminal().is_none());
        assert_eq!(it.apply_raw(r#"{"type": "status", "message": "still here"}"#), Interpretation::Applied);
        assert_eq!(it.last_status(), Some("still here"));
    }

    #[test]
    fn test_chunk_progress() {
        let mut it = ExtractionInterpreter::new("doc-1");
        it.apply(ExtractionEvent::ChunkingComplete { total_chunks: 3 });
        it.apply(ExtractionEvent::ChunkStart { index: 0 });
        it.apply(ExtractionEvent::ChunkComplete { index: 0 });
        it.apply(ExtractionEvent::ChunkStart { index: 1 });
        it.apply(ExtractionEvent::ChunkError {
            index: 1,
            message: "timeout".into(),
        });
        it.apply(ExtractionEvent::ChunkStart { index: 2 });

        let progress = it.progress();
        assert_eq!(progress.total, Some(3));
        assert_eq!(progress.started, 3);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.current, Some(2));
        assert_eq!(it.anomalies(), 0);
    }

    #[test]
    fn test_chunk_ordering_anomalies() {
        let mut it = ExtractionInterpreter::new("doc-1");
        assert_eq!(it.apply(ExtractionEvent::ChunkComplete { index: 4 }), Interpretation::Skipped);
        it.apply(ExtractionEvent::ChunkStart { index: 0 });
        assert_eq!(it.apply(ExtractionEvent::ChunkStart { index: 0 }), Interpretation::Skipped);
        assert_eq!(
            it.apply(ExtractionEvent::ChunkingComplete { total_chunks: 2 }),
            Interpretation::Skipped
        );
        it.apply(ExtractionEvent::ChunkComplete { index: 0 });
        assert_eq!(it.apply(ExtractionEvent::ChunkComplete { index: 0 }), Interpretation::Skipped);
        assert_eq!(it.anomalies(), 4);
        assert_eq!(it.progress().completed, 1);
        assert_eq!(it.progress().total, None);
    }

    #[test]
    fn test_event_log_records_accepted_events_in_order() {
        let mut it = ExtractionInterpreter::new("doc-1");
        it.apply(ExtractionEvent::Status {
            message: "loading".into(),
        });
        it.apply(token("dropped"));
        it.apply(ExtractionEvent::LlmStart);
        let kinds: Vec<&str> = it.events().iter().map(|e| e.event.kind()).collect();
        assert_eq!(kinds, vec!["status", "llm_start"]);
    }
}
