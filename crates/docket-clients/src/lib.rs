mod extraction;
mod framing;
mod parser;
mod source;

pub use extraction::HttpExtractionService;
pub use framing::LineFramer;
pub use parser::HttpDocumentParser;
pub use source::FsDocumentSource;

use docket_core::error::{DocketError, Result};

/// Resolve `path` against a service base URL, keeping any base path.
pub(crate) fn endpoint(base: &url::Url, path: &str) -> Result<url::Url> {
    base.join(path)
        .map_err(|e| DocketError::Config(format!("invalid endpoint {path} for {base}: {e}")))
}

pub(crate) fn base_url(raw: &str) -> Result<url::Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    url::Url::parse(&raw).map_err(|e| DocketError::Config(format!("invalid service URL {raw}: {e}")))
}
