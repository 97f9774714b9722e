//! Document backend driver.
//!
//! Turns a reference path into plain text for indexing. PDFs go through
//! `pdf-extract` on the blocking pool; every other file is read as UTF-8.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};

use parley_core::error::ParleyError;

/// Text-extraction capability of a document store.
#[async_trait]
pub trait DocumentDriver: Send + Sync {
    /// Extract the full text of the document at `path`.
    async fn extract_text(&self, path: &str) -> Result<String, ParleyError>;

    /// Whether the document exists and is a regular file.
    async fn can_connect(&self, path: &str) -> bool;
}

/// Filesystem-backed [`DocumentDriver`].
#[derive(Debug, Clone, Default)]
pub struct FileDocumentDriver;

impl FileDocumentDriver {
    pub fn new() -> Self {
        Self
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

#[async_trait]
impl DocumentDriver for FileDocumentDriver {
    async fn extract_text(&self, path: &str) -> Result<String, ParleyError> {
        let path = Path::new(path).to_path_buf();

        let text = if is_pdf(&path) {
            let display = path.display().to_string();
            tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path))
                .await
                .map_err(|e| ParleyError::Document(format!("Extraction task panicked: {}", e)))?
                .map_err(|e| {
                    ParleyError::Document(format!("Failed to extract {}: {}", display, e))
                })?
        } else {
            tokio::fs::read_to_string(&path).await.map_err(|e| {
                ParleyError::Document(format!("Failed to read {}: {}", path.display(), e))
            })?
        };

        debug!(chars = text.len(), "Extracted document text");
        Ok(text)
    }

    async fn can_connect(&self, path: &str) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.is_file(),
            Err(e) => {
                warn!(path, error = %e, "Document not reachable");
                false
            }
        }
    }
}
