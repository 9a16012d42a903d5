use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use docket_core::document::{DocumentParser, ParsedDocument, SourceDocument};
use docket_core::error::{DocketError, Result};

/// Client for the document parser service.
pub struct HttpDocumentParser {
    client: reqwest::Client,
    base: url::Url,
}

#[derive(Debug, Deserialize)]
struct ParseEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<ParsedDocument>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpDocumentParser {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("docket-parser-client/0.1")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base: crate::base_url(base_url)?,
        })
    }
}

impl ParseEnvelope {
    fn into_result(self) -> Result<ParsedDocument> {
        match self {
            ParseEnvelope {
                success: true,
                data: Some(data),
                ..
            } => Ok(data),
            ParseEnvelope {
                success: true,
                data: None,
                ..
            } => Err(DocketError::Parser("parser reported success without data".into())),
            ParseEnvelope { error, .. } => Err(DocketError::Parser(
                error.unwrap_or_else(|| "parser reported failure".into()),
            )),
        }
    }
}

/// Unwrap the parser's `{success, data, error}` envelope.
fn parse_envelope(body: &str) -> Result<ParsedDocument> {
    serde_json::from_str::<ParseEnvelope>(body)
        .map_err(|e| DocketError::Parser(format!("unreadable parser response: {e}")))?
        .into_result()
}

#[async_trait]
impl DocumentParser for HttpDocumentParser {
    async fn ping(&self) -> Result<()> {
        let url = crate::endpoint(&self.base, "health")?;
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| DocketError::Parser(format!("parser unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocketError::Parser(format!("parser health returned status {status}")));
        }
        debug!("Parser is reachable");
        Ok(())
    }

    async fn parse(&self, source: &SourceDocument) -> Result<ParsedDocument> {
        let url = crate::endpoint(&self.base, "parse")?;
        info!(file = %source.file, size_bytes = source.size_bytes, "Sending document to parser");

        let response = self
            .client
            .post(url)
            .json(&json!({ "file": source.file }))
            .send()
            .await
            .map_err(|e| DocketError::Parser(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DocketError::Parser(format!("failed to read parser response: {e}")))?;

        if status.is_success() {
            return parse_envelope(&body);
        }
        // Error envelopes may come with a non-2xx status; prefer their message.
        let message = serde_json::from_str::<ParseEnvelope>(&body)
            .ok()
            .and_then(|envelope| envelope.error)
            .unwrap_or(body);
        Err(DocketError::Parser(format!("parser returned status {status}: {message}")))
    }
}
