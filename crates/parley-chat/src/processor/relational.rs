//! Natural language → SQL → natural language.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use parley_core::types::{ConversationHistory, ReferenceDescriptor, ReferenceType};
use parley_storage::RelationalDriver;

use crate::error::ChatError;
use crate::llm::LanguageModel;
use crate::metadata::FieldMetadataCache;
use crate::parser::extract_sql;
use crate::templates::{prompt, render_template, response, TemplateStore};

use super::{Processor, UNABLE_TO_PROCESS};

/// Answers queries against a relational table.
///
/// The column list is fetched through the field-metadata cache, the model
/// writes a statement for it, the driver runs the statement and the model
/// turns the rows back into prose.
pub struct RelationalProcessor {
    driver: Arc<dyn RelationalDriver>,
    metadata: Arc<FieldMetadataCache>,
    templates: Arc<dyn TemplateStore>,
    model: Arc<dyn LanguageModel>,
    max_tokens: u32,
}

impl RelationalProcessor {
    pub fn new(
        driver: Arc<dyn RelationalDriver>,
        metadata: Arc<FieldMetadataCache>,
        templates: Arc<dyn TemplateStore>,
        model: Arc<dyn LanguageModel>,
        max_tokens: u32,
    ) -> Self {
        Self {
            driver,
            metadata,
            templates,
            model,
            max_tokens,
        }
    }

    pub fn metadata(&self) -> &Arc<FieldMetadataCache> {
        &self.metadata
    }

    async fn complete_turn(
        &self,
        history: &mut ConversationHistory,
        user_prompt: String,
    ) -> Result<String, ChatError> {
        history.add_user_message(user_prompt);
        let reply = self.model.complete(history, self.max_tokens).await?;
        history.add_assistant_message(reply.clone());
        Ok(reply)
    }
}

#[async_trait]
impl Processor for RelationalProcessor {
    fn kind(&self) -> ReferenceType {
        ReferenceType::Relational
    }

    async fn process(
        &self,
        descriptor: &ReferenceDescriptor,
        history: &mut ConversationHistory,
        connection: &str,
        query: &str,
    ) -> Result<String, ChatError> {
        let (schema, table) = descriptor.schema_and_table().ok_or_else(|| {
            ChatError::Backend(format!(
                "reference '{}' is not in schema.table form",
                descriptor.reference
            ))
        })?;

        let fields = self
            .metadata
            .get_or_compute(&descriptor.subject, schema, table, || {
                self.driver.describe_columns(connection, schema, table)
            })
            .await?;

        let template = self.templates.prompt(prompt::GENERATE_SQL).await?;
        let reply = self
            .complete_turn(history, render_template(&template, &[&fields, query]))
            .await?;

        let sql = extract_sql(&reply);
        debug!(subject = %descriptor.subject, sql = %sql, "Executing generated query");

        let data = match self.driver.execute(connection, &sql).await {
            Ok(data) => data,
            Err(e) => {
                warn!(subject = %descriptor.subject, error = %e, "Query execution failed");
                return Ok(UNABLE_TO_PROCESS.to_string());
            }
        };

        if data.trim().is_empty() {
            info!(subject = %descriptor.subject, "Query returned no rows");
            return self.templates.response(response::NO_RESULT).await;
        }

        let template = self.templates.prompt(prompt::MAKE_DATA_READABLE).await?;
        self.complete_turn(history, render_template(&template, &[&data, &fields]))
            .await
    }
}
