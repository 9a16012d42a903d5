use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use docket_core::document::{DocumentSource, SourceDocument};
use docket_core::error::{DocketError, Result};

/// Reads source documents from the local filesystem.
pub struct FsDocumentSource {
    root: Option<PathBuf>,
}

impl FsDocumentSource {
    /// Relative paths are resolved against `root` when one is given.
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl DocumentSource for FsDocumentSource {
    async fn read(&self, file: &str) -> Result<SourceDocument> {
        let path = self.resolve(file);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| DocketError::Source(format!("cannot read {}: {e}", path.display())))?;

        if !metadata.is_file() {
            return Err(DocketError::Source(format!("{} is not a file", path.display())));
        }
        if metadata.len() == 0 {
            return Err(DocketError::Source(format!("{} is empty", path.display())));
        }

        debug!(path = %path.display(), size_bytes = metadata.len(), "Read source document");

        Ok(SourceDocument {
            file: path.to_string_lossy().into_owned(),
            size_bytes: metadata.len(),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("docket-source-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_reads_relative_file_under_root() {
        let dir = scratch_dir("ok");
        std::fs::write(dir.join("paper.pdf"), b"%PDF-1.7").unwrap();

        let source = FsDocumentSource::new(Some(dir.clone()));
        let doc = source.read("paper.pdf").await.unwrap();
        assert_eq!(doc.size_bytes, 8);
        assert!(doc.file.ends_with("paper.pdf"));
        assert!(doc.modified_at.is_some());
    }

    #[tokio::test]
    async fn test_rejects_missing_empty_and_directories() {
        let dir = scratch_dir("bad");
        std::fs::write(dir.join("empty.pdf"), b"").unwrap();
        let source = FsDocumentSource::new(Some(dir.clone()));

        assert!(source.read("missing.pdf").await.is_err());
        assert!(source.read("empty.pdf").await.unwrap_err().to_string().contains("empty"));
        let dir_path = dir.to_string_lossy().into_owned();
        assert!(source.read(&dir_path).await.unwrap_err().to_string().contains("not a file"));
    }
}
