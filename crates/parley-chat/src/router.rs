//! Conversational router: classify, resolve, dispatch.
//!
//! One call to [`ConversationalRouter::converse`] is one turn. The router
//! checks out the requestor's history, asks the model which subject the
//! query concerns, and either answers casually or hands the history to the
//! processor registered for that subject's backend type. Every failure is
//! turned into a user-facing string here; nothing propagates to the caller.

use std::sync::Arc;

use tracing::{debug, info, warn};

use parley_core::types::ConversationHistory;

use crate::catalog::ReferenceCatalog;
use crate::error::ChatError;
use crate::llm::LanguageModel;
use crate::metadata::FieldMetadataCache;
use crate::parser::{parse_classification, Classification};
use crate::processor::{ProcessorRegistry, UNABLE_TO_PROCESS};
use crate::session::SessionStore;
use crate::templates::{prompt, render_template, TemplateStore};

/// Prefix of the reply sent after a rate-limit failure.
pub const RATE_LIMITED: &str = "Please enter your query in 1 min.";

/// Entries removed by one [`ConversationalRouter::purge_expired`] sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub sessions: usize,
    pub field_metadata: usize,
}

/// Top-level orchestrator for conversational turns.
pub struct ConversationalRouter {
    catalog: Arc<ReferenceCatalog>,
    sessions: Arc<SessionStore>,
    templates: Arc<dyn TemplateStore>,
    model: Arc<dyn LanguageModel>,
    processors: ProcessorRegistry,
    metadata: Option<Arc<FieldMetadataCache>>,
    max_tokens: u32,
}

impl ConversationalRouter {
    pub fn new(
        catalog: Arc<ReferenceCatalog>,
        sessions: Arc<SessionStore>,
        templates: Arc<dyn TemplateStore>,
        model: Arc<dyn LanguageModel>,
        processors: ProcessorRegistry,
        max_tokens: u32,
    ) -> Self {
        Self {
            catalog,
            sessions,
            templates,
            model,
            processors,
            metadata: None,
            max_tokens,
        }
    }

    /// Include `metadata` in [`purge_expired`](Self::purge_expired) sweeps.
    pub fn with_metadata_cache(mut self, metadata: Arc<FieldMetadataCache>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Answer one turn for `requestor`.
    ///
    /// A rate limit anywhere in the turn clears the requestor's history and
    /// returns a retry message carrying the provider's error. Any other
    /// failure returns [`UNABLE_TO_PROCESS`].
    pub async fn converse(&self, query: &str, requestor: &str) -> String {
        let mut history = self.sessions.checkout(requestor);
        debug!(requestor, history_len = history.len(), "Turn started");

        match self.turn(&mut history, query).await {
            Ok(reply) => {
                self.sessions.store(requestor, history);
                reply
            }
            Err(e) if e.is_rate_limited() => {
                warn!(requestor, error = %e, "Rate limited, clearing history");
                self.sessions.reset(requestor);
                format!("{}\n{}", RATE_LIMITED, e)
            }
            Err(e) => {
                warn!(requestor, error = %e, "Turn failed");
                self.sessions.store(requestor, history);
                UNABLE_TO_PROCESS.to_string()
            }
        }
    }

    async fn turn(
        &self,
        history: &mut ConversationHistory,
        query: &str,
    ) -> Result<String, ChatError> {
        let subjects = self.catalog.subjects();
        let subject_list = subjects.join(", ");

        let context = self.templates.prompt(prompt::CONTEXT).await?;
        history.add_system_message(render_template(&context, &[&subject_list]));

        let classify = self.templates.prompt(prompt::IS_CLASSIFIED).await?;
        history.add_user_message(render_template(&classify, &[&subject_list, query]));
        let verdict = self.model.complete(history, self.max_tokens).await?;

        let subject = match parse_classification(&verdict, &subjects) {
            Classification::Subject(subject) => subject,
            Classification::Unclassified => {
                debug!(verdict = %verdict, "Query not classified");
                return self.casual(history, query).await;
            }
        };

        let resolved = self.catalog.resolve(&subject)?;
        let kind = resolved.descriptor.kind;
        let processor = self
            .processors
            .get(kind)
            .ok_or(ChatError::Unsupported(kind))?;

        info!(subject = %subject, kind = %kind, "Dispatching query");
        processor
            .process(&resolved.descriptor, history, &resolved.connection, query)
            .await
    }

    async fn casual(
        &self,
        history: &mut ConversationHistory,
        query: &str,
    ) -> Result<String, ChatError> {
        let template = self.templates.prompt(prompt::NOT_CLASSIFIED).await?;
        history.add_user_message(render_template(&template, &[query]));
        let reply = self.model.complete(history, self.max_tokens).await?;
        history.add_assistant_message(reply.clone());
        Ok(reply)
    }

    /// Raw prompt template. Unknown keys are `NotFound`.
    pub async fn get_prompt(&self, key: &str) -> Result<String, ChatError> {
        self.templates.prompt(key).await
    }

    /// Raw response template. Unknown keys are `NotFound`.
    pub async fn get_response(&self, key: &str) -> Result<String, ChatError> {
        self.templates.response(key).await
    }

    pub fn get_subjects(&self) -> Vec<String> {
        self.catalog.subjects()
    }

    pub fn catalog(&self) -> &Arc<ReferenceCatalog> {
        &self.catalog
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Drop expired sessions and field metadata.
    pub fn purge_expired(&self) -> SweepStats {
        let stats = SweepStats {
            sessions: self.sessions.purge_expired(),
            field_metadata: self
                .metadata
                .as_ref()
                .map(|m| m.purge_expired())
                .unwrap_or(0),
        };
        if stats != SweepStats::default() {
            info!(
                sessions = stats.sessions,
                field_metadata = stats.field_metadata,
                "Purged expired cache entries"
            );
        }
        stats
    }
}
