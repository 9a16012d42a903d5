use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use docket_core::{
    DocketError, DocumentParser, DocumentRecord, DocumentSource, ParsedDocument, PipelineConfig,
    ProcessingJob, Result, ResultStore, StepStatus,
};

const READ_SOURCE: usize = 0;
const CONNECT_PARSER: usize = 1;
const PARSE_DOCUMENT: usize = 2;
const TRANSFORM_RESULT: usize = 3;
const PERSIST_RESULT: usize = 4;

/// Runs one document job through read, connect, parse, transform and
/// persist. Each step is entered and left through the job's tracker, so
/// a failure leaves every later step pending.
pub struct DocumentPipeline {
    source: Arc<dyn DocumentSource>,
    parser: Arc<dyn DocumentParser>,
    store: Arc<dyn ResultStore>,
    config: PipelineConfig,
}

impl DocumentPipeline {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        parser: Arc<dyn DocumentParser>,
        store: Arc<dyn ResultStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            parser,
            store,
            config,
        }
    }

    /// Process a job to a terminal state. Errors are recorded on the job.
    pub async fn run(&self, job: &mut ProcessingJob) {
        info!(job_id = %job.id, file = %job.file, "Processing document");

        match self.execute(job).await {
            Ok(record) => {
                let title = record.title.clone().unwrap_or_default();
                match job.succeed(record) {
                    Ok(()) => info!(job_id = %job.id, file = %job.file, title = %title, "Document processed"),
                    Err(e) => {
                        warn!(job_id = %job.id, error = %e, "Could not finish job");
                        let _ = job.abort(e.to_string());
                    }
                }
            }
            Err(e) => {
                if !job.is_terminal() {
                    let _ = job.abort(e.to_string());
                }
            }
        }
    }

    async fn execute(&self, job: &mut ProcessingJob) -> Result<DocumentRecord> {
        job.reset()?;
        let file = job.file.clone();
        let session_id = job.session_id.clone();

        let source = run_step(job, READ_SOURCE, self.source.read(&file)).await?;

        run_step(job, CONNECT_PARSER, self.parser.ping()).await?;

        let timeout = self.config.parse_timeout;
        let parsed = run_step(job, PARSE_DOCUMENT, async {
            tokio::time::timeout(timeout, self.parser.parse(&source))
                .await
                .map_err(|_| {
                    DocketError::Timeout(format!("parser did not answer within {}s", timeout.as_secs()))
                })?
        })
        .await?;

        let record = run_step(job, TRANSFORM_RESULT, async {
            transform(&file, session_id, parsed)
        })
        .await?;

        run_step(job, PERSIST_RESULT, self.store.persist(&record)).await?;

        Ok(record)
    }
}

/// Mark `step` in progress, run `op`, then mark it completed or failed.
async fn run_step<T, F>(job: &mut ProcessingJob, step: usize, op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    job.advance(step, StepStatus::InProgress)?;
    match op.await {
        Ok(value) => {
            job.advance(step, StepStatus::Completed)?;
            Ok(value)
        }
        Err(e) => {
            job.fail(step, e.to_string())?;
            Err(e)
        }
    }
}

/// Validate the parser output and normalize it into a persistable record.
pub fn transform(
    file: &str,
    session_id: Option<String>,
    parsed: ParsedDocument,
) -> Result<DocumentRecord> {
    let title = parsed
        .title
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty());

    if title.is_none() && parsed.content.trim().is_empty() {
        return Err(DocketError::Transform(format!(
            "parser returned neither title nor content for {file}"
        )));
    }

    let mut authors: Vec<String> = Vec::with_capacity(parsed.authors.len());
    for author in parsed.authors {
        let author = author.trim().to_string();
        if !author.is_empty() && !authors.contains(&author) {
            authors.push(author);
        }
    }

    Ok(DocumentRecord {
        file: file.to_string(),
        session_id,
        title,
        authors,
        reference_count: parsed.references.len(),
        content_length: parsed.content.chars().count(),
        parsed_at: Utc::now(),
    })
}
