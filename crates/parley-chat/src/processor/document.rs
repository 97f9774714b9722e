//! Retrieval-augmented answers over indexed documents.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use parley_core::config::RetrievalConfig;
use parley_core::types::{ConversationHistory, ReferenceDescriptor, ReferenceType};
use parley_storage::DocumentDriver;
use parley_vector::SemanticMemory;

use crate::error::ChatError;
use crate::llm::LanguageModel;
use crate::templates::{prompt, render_template, TemplateStore};

use super::{Processor, UNABLE_TO_PROCESS};

const PASSAGE_SEPARATOR: &str = "\n---\n";

/// Answers queries from a document's text.
///
/// The first turn for a subject extracts the document and saves it into
/// semantic memory under the subject's name. Later turns, and turns racing
/// the first one, reuse that collection.
pub struct DocumentProcessor {
    driver: Arc<dyn DocumentDriver>,
    memory: Arc<SemanticMemory>,
    templates: Arc<dyn TemplateStore>,
    model: Arc<dyn LanguageModel>,
    max_tokens: u32,
    limit: usize,
    min_relevance: f64,
    indexing: DashMap<String, Arc<Mutex<()>>>,
}

impl DocumentProcessor {
    pub fn new(
        driver: Arc<dyn DocumentDriver>,
        memory: Arc<SemanticMemory>,
        templates: Arc<dyn TemplateStore>,
        model: Arc<dyn LanguageModel>,
        max_tokens: u32,
    ) -> Self {
        let retrieval = RetrievalConfig::default();
        Self {
            driver,
            memory,
            templates,
            model,
            max_tokens,
            limit: retrieval.limit,
            min_relevance: retrieval.min_relevance,
            indexing: DashMap::new(),
        }
    }

    /// Recall limits from `[retrieval]`.
    pub fn with_retrieval(mut self, config: &RetrievalConfig) -> Self {
        self.limit = config.limit;
        self.min_relevance = config.min_relevance;
        self
    }

    pub fn memory(&self) -> &Arc<SemanticMemory> {
        &self.memory
    }

    /// Index `path` under `collection` unless that collection already exists.
    ///
    /// Concurrent callers for the same collection wait for one extraction.
    pub async fn ensure_indexed(&self, collection: &str, path: &str) -> Result<(), ChatError> {
        if self.memory.has_collection(collection) {
            return Ok(());
        }

        let gate = self
            .indexing
            .entry(collection.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        if self.memory.has_collection(collection) {
            debug!(collection, "Indexed while waiting");
            return Ok(());
        }

        let text = self.driver.extract_text(path).await?;
        let summary = self
            .memory
            .save_information(collection, collection, &text)
            .await?;
        info!(
            collection,
            path,
            chunks = summary.stored,
            "Indexed document"
        );
        Ok(())
    }

    /// Complete `template` with passages recalled for `input` from `collection`.
    ///
    /// The rendered prompt and the reply are both appended to `history`.
    pub async fn complete_with_retrieval(
        &self,
        history: &mut ConversationHistory,
        template: &str,
        input: &str,
        collection: &str,
    ) -> Result<String, ChatError> {
        let records = self
            .memory
            .search(collection, input, self.limit, self.min_relevance)
            .await?;
        debug!(collection, recalled = records.len(), "Recalled passages");

        let passages = records
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join(PASSAGE_SEPARATOR);

        history.add_user_message(render_template(template, &[&passages, input]));
        let reply = self.model.complete(history, self.max_tokens).await?;
        history.add_assistant_message(reply.clone());
        Ok(reply)
    }
}

#[async_trait]
impl Processor for DocumentProcessor {
    fn kind(&self) -> ReferenceType {
        ReferenceType::Document
    }

    async fn process(
        &self,
        descriptor: &ReferenceDescriptor,
        history: &mut ConversationHistory,
        connection: &str,
        query: &str,
    ) -> Result<String, ChatError> {
        let collection = descriptor.subject.as_str();

        match self.ensure_indexed(collection, connection).await {
            Ok(()) => {}
            Err(e) if e.is_rate_limited() => return Err(e),
            Err(e) => {
                warn!(subject = %collection, path = %connection, error = %e, "Document indexing failed");
                return Ok(UNABLE_TO_PROCESS.to_string());
            }
        }

        let template = self.templates.prompt(prompt::MEMORY_CONTENT).await?;
        match self
            .complete_with_retrieval(history, &template, query, collection)
            .await
        {
            Err(ChatError::Backend(e)) => {
                warn!(subject = %collection, error = %e, "Document recall failed");
                Ok(UNABLE_TO_PROCESS.to_string())
            }
            other => other,
        }
    }
}
