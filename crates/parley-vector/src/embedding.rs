//! Embedding service trait and implementations.
//!
//! - `HttpEmbedding` calls an OpenAI-compatible `/embeddings` endpoint
//!   (OpenAI, Azure OpenAI deployments, or any compatible gateway).
//! - `HashEmbedding` produces deterministic feature-hashed bag-of-words
//!   vectors. It needs no network and gives lexical (not semantic)
//!   similarity, which is enough for offline use and tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use parley_core::error::ParleyError;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

/// Service for generating text embeddings.
///
/// Implementations convert text into fixed-dimensional vectors. Used for
/// both indexing document chunks and embedding recall queries.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, ParleyError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// `EmbeddingService::embed` returns `impl Future` and so is not object-safe.
/// This trait boxes the future, allowing `Arc<dyn DynEmbeddingService>` to be
/// stored without generics. Every `EmbeddingService` gets it via the blanket
/// impl below.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, ParleyError>> + Send + 'a>>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, ParleyError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ---------------------------------------------------------------------------
// HttpEmbedding - remote OpenAI-compatible embeddings
// ---------------------------------------------------------------------------

/// How the embeddings endpoint expects the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuth {
    /// `Authorization: Bearer <key>` (OpenAI, DeepSeek, most gateways).
    Bearer(String),
    /// `api-key: <key>` (Azure OpenAI).
    ApiKeyHeader(String),
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Embedding service backed by an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbedding {
    client: Client,
    url: String,
    auth: ApiAuth,
    model: String,
    dimensions: usize,
}

impl HttpEmbedding {
    /// `url` is the full embeddings URL, including any query string.
    pub fn new(
        url: impl Into<String>,
        auth: ApiAuth,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, ParleyError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Embedding(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            auth,
            model: model.into(),
            dimensions,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl EmbeddingService for HttpEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ParleyError> {
        if text.trim().is_empty() {
            return Err(ParleyError::Embedding("Cannot embed empty text".to_string()));
        }

        let mut req = self
            .client
            .post(&self.url)
            .json(&json!({ "model": self.model, "input": text }));
        req = match &self.auth {
            ApiAuth::Bearer(key) => req.bearer_auth(key),
            ApiAuth::ApiKeyHeader(key) => req.header("api-key", key),
        };

        let response = req
            .send()
            .await
            .map_err(|e| ParleyError::Embedding(format!("Embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!(model = %self.model, "Embedding rate limited");
                return Err(ParleyError::RateLimited(format!(
                    "HTTP 429 Too Many Requests: {}",
                    body
                )));
            }
            return Err(ParleyError::Embedding(format!(
                "Embedding API error {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ParleyError::Embedding(format!("Embedding response: {}", e)))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ParleyError::Embedding("Embedding response had no data".to_string()))?;

        debug!(model = %self.model, dims = embedding.len(), "Embedded text");
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// HashEmbedding - deterministic feature hashing
// ---------------------------------------------------------------------------

/// Feature-hashing embedder: lowercase word tokens are hashed into signed
/// buckets, then the vector is L2-normalized.
///
/// Texts sharing vocabulary land close together, so identical inputs always
/// score 1.0 and unrelated inputs score near 0.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimensions: usize,
}

impl HashEmbedding {
    pub const DEFAULT_DIMENSIONS: usize = 384;

    pub fn new() -> Self {
        Self::with_dimensions(Self::DEFAULT_DIMENSIONS)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result = vec![0.0f32; self.dimensions];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase());

        for token in tokens {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            result[bucket] += sign;
        }

        l2_normalize(&mut result);
        result
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingService for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ParleyError> {
        if text.is_empty() {
            return Err(ParleyError::Embedding("Cannot embed empty text".to_string()));
        }
        Ok(self.hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
