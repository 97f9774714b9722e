//! Scripted backend drivers for tests and offline demos.
//!
//! Pair with [`crate::llm::ScriptedModel`] to drive a full conversation
//! without a database, a document or a model endpoint.
//! [`RateLimitedEmbedding`] stands in for an embeddings endpoint out of quota.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use parley_core::error::ParleyError;
use parley_storage::{DocumentDriver, RelationalDriver};
use parley_vector::EmbeddingService;

/// Relational driver returning a fixed column description and queued
/// query results. Records every executed statement.
#[derive(Debug)]
pub struct ScriptedRelationalDriver {
    columns: String,
    results: Mutex<VecDeque<Result<String, ParleyError>>>,
    executed: Mutex<Vec<String>>,
    describe_calls: AtomicUsize,
    reachable: bool,
}

impl ScriptedRelationalDriver {
    pub fn new(columns: impl Into<String>) -> Self {
        Self {
            columns: columns.into(),
            results: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
            describe_calls: AtomicUsize::new(0),
            reachable: true,
        }
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn push_result(&self, rows: impl Into<String>) {
        if let Ok(mut results) = self.results.lock() {
            results.push_back(Ok(rows.into()));
        }
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut results) = self.results.lock() {
            results.push_back(Err(ParleyError::Storage(message.into())));
        }
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    /// Statements passed to `execute`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RelationalDriver for ScriptedRelationalDriver {
    async fn describe_columns(
        &self,
        _connection: &str,
        _schema: &str,
        _table: &str,
    ) -> Result<String, ParleyError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.columns.clone())
    }

    async fn execute(&self, _connection: &str, query: &str) -> Result<String, ParleyError> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(query.to_string());
        }
        self.results
            .lock()
            .map_err(|e| ParleyError::Storage(format!("script lock poisoned: {}", e)))?
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }

    async fn can_connect(&self, _connection: &str) -> bool {
        self.reachable
    }
}

/// Document driver serving one fixed text. Counts extractions.
#[derive(Debug)]
pub struct ScriptedDocumentDriver {
    text: Option<String>,
    extract_calls: AtomicUsize,
}

impl ScriptedDocumentDriver {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            extract_calls: AtomicUsize::new(0),
        }
    }

    /// A driver whose document cannot be read.
    pub fn missing() -> Self {
        Self {
            text: None,
            extract_calls: AtomicUsize::new(0),
        }
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentDriver for ScriptedDocumentDriver {
    async fn extract_text(&self, path: &str) -> Result<String, ParleyError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        // Yield so concurrent first turns overlap inside indexing.
        tokio::task::yield_now().await;
        self.text
            .clone()
            .ok_or_else(|| ParleyError::Document(format!("Failed to read {}", path)))
    }

    async fn can_connect(&self, _path: &str) -> bool {
        self.text.is_some()
    }
}

/// Embedding service whose quota is always exhausted.
#[derive(Debug, Default)]
pub struct RateLimitedEmbedding;

impl EmbeddingService for RateLimitedEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ParleyError> {
        Err(ParleyError::RateLimited(
            "HTTP 429 Too Many Requests: embedding quota exceeded".to_string(),
        ))
    }

    fn dimensions(&self) -> usize {
        8
    }
}
