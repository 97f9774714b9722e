//! Conversational query routing for Parley.
//!
//! A turn flows through the [`ConversationalRouter`]: the query is
//! classified against the subjects in the [`ReferenceCatalog`], and either
//! answered casually or dispatched to the [`Processor`] registered for the
//! subject's backend type. Conversation history lives in the expiring
//! [`SessionStore`]; column metadata in the [`FieldMetadataCache`].

pub mod catalog;
pub mod error;
pub mod health;
pub mod llm;
pub mod metadata;
pub mod parser;
pub mod processor;
pub mod router;
pub mod session;
pub mod templates;
pub mod testing;

pub use catalog::{ReferenceCatalog, ResolvedReference};
pub use error::{ChatError, LlmError};
pub use health::{check_health, HealthReport};
pub use llm::{LanguageModel, OpenAiCompatibleModel, ScriptedModel};
pub use metadata::FieldMetadataCache;
pub use parser::{extract_sql, parse_classification, Classification};
pub use processor::{
    DocumentProcessor, Processor, ProcessorRegistry, RelationalProcessor, UNABLE_TO_PROCESS,
};
pub use router::{ConversationalRouter, SweepStats, RATE_LIMITED};
pub use session::SessionStore;
pub use templates::{JsonTemplateStore, StaticTemplateStore, TemplateStore};
