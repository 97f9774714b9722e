//! Error types for the conversational router.

use parley_core::error::ParleyError;
use parley_core::types::ReferenceType;

/// Failures of the language-model capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    /// Quota or rate limit hit (HTTP 429). Carries the provider's message.
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected response: {0}")]
    Response(String),
    #[error("model returned an empty completion")]
    EmptyCompletion,
}

/// Errors from the conversational router and its processors.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Unknown subject or template key.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("LLM error: {0}")]
    Llm(LlmError),
    /// Template file missing or unreadable.
    #[error("template error: {0}")]
    Template(String),
    /// Relational or document backend failure.
    #[error("backend error: {0}")]
    Backend(String),
    #[error("no processor registered for {0} subjects")]
    Unsupported(ReferenceType),
}

impl ChatError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ChatError::RateLimited(_))
    }
}

impl From<LlmError> for ChatError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited(message) => ChatError::RateLimited(message),
            other => ChatError::Llm(other),
        }
    }
}

impl From<ParleyError> for ChatError {
    fn from(err: ParleyError) -> Self {
        match err {
            ParleyError::NotFound(what) => ChatError::NotFound(what),
            ParleyError::RateLimited(message) => ChatError::RateLimited(message),
            other => ChatError::Backend(other.to_string()),
        }
    }
}
