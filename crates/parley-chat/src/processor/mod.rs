//! Backend processors and their registry.
//!
//! Each [`Processor`] answers queries for one [`ReferenceType`]. The router
//! looks the processor up by the resolved descriptor's type and hands it the
//! requestor's history by exclusive reference; the processor appends zero or
//! more messages before returning the reply.

pub mod document;
pub mod relational;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use parley_core::types::{ConversationHistory, ReferenceDescriptor, ReferenceType};

use crate::error::ChatError;

pub use document::DocumentProcessor;
pub use relational::RelationalProcessor;

/// Fixed reply for failures that are recovered rather than surfaced.
pub const UNABLE_TO_PROCESS: &str = "Unable to process your query.";

/// Answers a query against one kind of backend.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Backend type this processor serves.
    fn kind(&self) -> ReferenceType;

    /// Answer `query` from the backend described by `descriptor`.
    ///
    /// Backend failures are recovered locally as [`UNABLE_TO_PROCESS`];
    /// rate limits are returned as [`ChatError::RateLimited`].
    async fn process(
        &self,
        descriptor: &ReferenceDescriptor,
        history: &mut ConversationHistory,
        connection: &str,
        query: &str,
    ) -> Result<String, ChatError>;
}

/// Processors keyed by the backend type they serve.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<ReferenceType, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `processor` under its own kind, replacing any previous one.
    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        self.processors.insert(processor.kind(), processor);
    }

    pub fn with(mut self, processor: Arc<dyn Processor>) -> Self {
        self.register(processor);
        self
    }

    pub fn get(&self, kind: ReferenceType) -> Option<Arc<dyn Processor>> {
        self.processors.get(&kind).cloned()
    }

    /// Registered kinds, sorted by name.
    pub fn kinds(&self) -> Vec<ReferenceType> {
        let mut kinds: Vec<_> = self.processors.keys().copied().collect();
        kinds.sort_by_key(|k| k.to_string());
        kinds
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
