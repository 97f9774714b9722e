//! Language-model capability.
//!
//! [`LanguageModel`] is the seam the router and processors complete
//! against. [`OpenAiCompatibleModel`] talks to OpenAI, Azure OpenAI or
//! DeepSeek over their shared chat-completions wire format;
//! [`ScriptedModel`] replays canned replies for tests and offline demos.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use parley_core::config::{AiConfig, AiPlatform};
use parley_core::types::ConversationHistory;
use parley_vector::ApiAuth;

use crate::error::LlmError;

/// Chat completion over a conversation history.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete the conversation. The returned text is trimmed.
    async fn complete(
        &self,
        history: &ConversationHistory,
        max_tokens: u32,
    ) -> Result<String, LlmError>;

    /// Model or deployment name, for health reporting.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible HTTP client
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for OpenAI-compatible providers.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleModel {
    client: Client,
    url: String,
    auth: ApiAuth,
    model: String,
}

impl OpenAiCompatibleModel {
    pub fn from_config(config: &AiConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Request(format!("HTTP client: {}", e)))?;

        let (url, auth) = endpoint(config, "/chat/completions", &config.model)?;

        Ok(Self {
            client,
            url,
            auth,
            model: config.model.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Resolve the full URL and auth style for an OpenAI-compatible `path`
/// (`/chat/completions`, `/embeddings`) served by `deployment`.
///
/// Azure routes through `/openai/deployments/{deployment}{path}?api-version=..`
/// and authenticates with an `api-key` header; every other platform uses
/// `{endpoint}{path}` and a bearer token.
pub fn endpoint(
    config: &AiConfig,
    path: &str,
    deployment: &str,
) -> Result<(String, ApiAuth), LlmError> {
    let base = config.resolved_endpoint();
    if base.is_empty() {
        return Err(LlmError::Request(format!(
            "ai.endpoint must be set for platform {:?}",
            config.platform
        )));
    }
    let key = config.resolved_api_key();

    Ok(match config.platform {
        AiPlatform::AzureOpenAi => (
            format!(
                "{}/openai/deployments/{}{}?api-version={}",
                base, deployment, path, config.api_version
            ),
            ApiAuth::ApiKeyHeader(key),
        ),
        AiPlatform::OpenAi | AiPlatform::DeepSeek => {
            (format!("{}{}", base, path), ApiAuth::Bearer(key))
        }
    })
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    async fn complete(
        &self,
        history: &ConversationHistory,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: history
                .messages()
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens,
        };

        let mut req = self.client.post(&self.url).json(&body);
        req = match &self.auth {
            ApiAuth::Bearer(key) => req.bearer_auth(key),
            ApiAuth::ApiKeyHeader(key) => req.header("api-key", key),
        };

        debug!(model = %self.model, messages = history.len(), "Chat completion request");

        let response = req
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!(model = %self.model, "Completion rate limited");
                return Err(LlmError::RateLimited(format!(
                    "HTTP 429 Too Many Requests: {}",
                    text
                )));
            }
            return Err(LlmError::Request(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Response(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(LlmError::EmptyCompletion);
        }
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// ScriptedModel - canned replies for tests
// ---------------------------------------------------------------------------

/// Replays queued replies in order and records every history it was asked
/// to complete. Runs dry with `LlmError::Response`.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<ConversationHistory>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let model = Self::new();
        for reply in replies {
            model.push_reply(reply);
        }
        model
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Ok(reply.into()));
        }
    }

    pub fn push_error(&self, error: LlmError) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(error));
        }
    }

    /// Histories passed to `complete`, in call order.
    pub fn calls(&self) -> Vec<ConversationHistory> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        history: &ConversationHistory,
        _max_tokens: u32,
    ) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(history.clone());
        }
        let next = self
            .replies
            .lock()
            .map_err(|e| LlmError::Response(format!("script lock poisoned: {}", e)))?
            .pop_front();
        match next {
            Some(reply) => reply.map(|r| r.trim().to_string()),
            None => Err(LlmError::Response("no scripted reply left".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
