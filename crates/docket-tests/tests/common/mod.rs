//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use docket_core::{
    DocketError, DocumentParser, DocumentRecord, DocumentSource, EventStream, ExtractionConfig,
    ExtractionRequest, ExtractionService, ParsedDocument, PipelineConfig, Result, ResultStore,
    SourceDocument,
};
use docket_pipeline::Orchestrator;

#[derive(Default)]
pub struct MemorySource;

#[async_trait]
impl DocumentSource for MemorySource {
    async fn read(&self, file: &str) -> Result<SourceDocument> {
        Ok(SourceDocument {
            file: file.to_string(),
            size_bytes: file.len() as u64,
            modified_at: None,
        })
    }
}

/// Parser that fails for the listed files and records every call.
#[derive(Default)]
pub struct MemoryParser {
    pub failing: HashSet<String>,
    pub delay: Duration,
    pub calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MemoryParser {
    pub fn failing(files: &[&str]) -> Self {
        Self {
            failing: files.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentParser for MemoryParser {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn parse(&self, source: &SourceDocument) -> Result<ParsedDocument> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(source.file.clone());
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&source.file) {
            return Err(DocketError::Parser(format!("cannot parse {}", source.file)));
        }
        Ok(ParsedDocument {
            title: Some(format!("Title of {}", source.file)),
            authors: vec!["A. Author".into()],
            references: vec![],
            content: "content".into(),
            metadata: serde_json::Value::Null,
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub records: Mutex<Vec<DocumentRecord>>,
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn persist(&self, record: &DocumentRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// One scripted stream item: a raw message or a channel error.
#[derive(Clone)]
pub enum Frame {
    Message(&'static str),
    Fail(&'static str),
}

/// Extraction backend replaying a script, counting fallback calls.
pub struct ScriptedExtraction {
    pub frames: Vec<Frame>,
    pub hang_after: bool,
    pub fallback: std::result::Result<&'static str, &'static str>,
    pub fallback_calls: AtomicUsize,
    pub opened: Mutex<Vec<String>>,
}

impl ScriptedExtraction {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            hang_after: false,
            fallback: Err("fallback unavailable"),
            fallback_calls: AtomicUsize::new(0),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, body: &'static str) -> Self {
        self.fallback = Ok(body);
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang_after = true;
        self
    }

    pub fn fallback_calls(&self) -> usize {
        self.fallback_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionService for ScriptedExtraction {
    async fn open_stream(&self, request: &ExtractionRequest) -> Result<EventStream> {
        self.opened.lock().unwrap().push(request.document_id.clone());
        let items: Vec<Result<String>> = self
            .frames
            .iter()
            .map(|frame| match frame {
                Frame::Message(raw) => Ok(raw.to_string()),
                Frame::Fail(e) => Err(DocketError::Stream(e.to_string())),
            })
            .collect();
        let base = stream::iter(items);
        if self.hang_after {
            Ok(base.chain(stream::pending()).boxed())
        } else {
            Ok(base.boxed())
        }
    }

    async fn extract(&self, _request: &ExtractionRequest) -> Result<String> {
        self.fallback_calls.fetch_add(1, Ordering::SeqCst);
        self.fallback
            .map(str::to_string)
            .map_err(|e| DocketError::Extraction(e.to_string()))
    }
}

pub fn orchestrator(parser: Arc<MemoryParser>, extraction: Arc<ScriptedExtraction>) -> Orchestrator {
    Orchestrator::new(
        Arc::new(MemorySource),
        parser,
        Arc::new(MemoryStore::default()),
        extraction,
        PipelineConfig::default(),
        ExtractionConfig::default(),
    )
}

pub fn files(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}
