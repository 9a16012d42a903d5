use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use tracing::{debug, info};

use docket_core::error::{DocketError, Result};
use docket_core::extraction::{EventStream, ExtractionRequest, ExtractionService};

use crate::framing::LineFramer;

/// Client for the extraction backend.
///
/// `POST /extract/stream` answers with a long-lived body of SSE or NDJSON
/// messages; `POST /extract` answers with a single JSON document once the
/// whole extraction is done.
pub struct HttpExtractionService {
    client: reqwest::Client,
    base: url::Url,
    request_timeout: Duration,
}

impl HttpExtractionService {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        // No client-wide timeout: it would cut long streams off.
        let client = reqwest::Client::builder()
            .user_agent("docket-extraction-client/0.1")
            .build()?;

        Ok(Self {
            client,
            base: crate::base_url(base_url)?,
            request_timeout,
        })
    }

    fn body(request: &ExtractionRequest) -> serde_json::Value {
        json!({
            "document_id": request.document_id,
            "chunking_strategy": request.chunking_strategy.as_str(),
        })
    }
}

async fn ensure_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".to_string());
    Err(DocketError::Extraction(format!(
        "{what} returned status {status}: {body}"
    )))
}

#[async_trait]
impl ExtractionService for HttpExtractionService {
    async fn open_stream(&self, request: &ExtractionRequest) -> Result<EventStream> {
        let url = crate::endpoint(&self.base, "extract/stream")?;
        info!(document_id = %request.document_id, url = %url, "Opening extraction stream");

        let response = self
            .client
            .post(url)
            .header("accept", "text/event-stream, application/x-ndjson")
            .json(&Self::body(request))
            .send()
            .await
            .map_err(|e| DocketError::Stream(format!("failed to open stream: {e}")))?;
        let response = ensure_success(response, "extraction stream").await?;

        let mut bytes = response.bytes_stream();
        let messages = async_stream::stream! {
            let mut framer = LineFramer::default();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => match framer.push(&chunk) {
                        Ok(messages) => {
                            for message in messages {
                                yield Ok(message);
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                    Err(e) => {
                        yield Err(DocketError::Stream(format!("stream read failed: {e}")));
                        return;
                    }
                }
            }
            if let Some(message) = framer.finish() {
                yield Ok(message);
            }
            debug!("Extraction stream body ended");
        };

        Ok(messages.boxed())
    }

    async fn extract(&self, request: &ExtractionRequest) -> Result<String> {
        let url = crate::endpoint(&self.base, "extract")?;
        info!(document_id = %request.document_id, url = %url, "Requesting full extraction");

        let response = self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .json(&Self::body(request))
            .send()
            .await
            .map_err(|e| DocketError::Extraction(format!("HTTP request failed: {e}")))?;
        let response = ensure_success(response, "extraction").await?;

        response
            .text()
            .await
            .map_err(|e| DocketError::Extraction(format!("failed to read extraction body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_core::strategy::ChunkingStrategy;

    #[test]
    fn test_request_body() {
        let body = HttpExtractionService::body(&ExtractionRequest {
            document_id: "doc-7".into(),
            chunking_strategy: ChunkingStrategy::TokenBounded,
        });
        assert_eq!(body["document_id"], "doc-7");
        assert_eq!(body["chunking_strategy"], ChunkingStrategy::TokenBounded.as_str());
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(HttpExtractionService::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_endpoints_keep_base_path() {
        let service = HttpExtractionService::new("http://host:9000/api", Duration::from_secs(1)).unwrap();
        let url = crate::endpoint(&service.base, "extract/stream").unwrap();
        assert_eq!(url.as_str(), "http://host:9000/api/extract/stream");
    }
}
