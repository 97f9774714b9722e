//! Collection-keyed semantic memory.
//!
//! `SemanticMemory` stores document text as embedded chunks, one
//! [`VectorIndex`] per collection name, and recalls the passages most
//! relevant to a query. Saving runs each chunk through:
//! 1. Chunking (sliding character window)
//! 2. Embedding
//! 3. Near-duplicate suppression (repeated page headers, footers)
//! 4. Vector index insertion

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use parley_core::config::RetrievalConfig;
use parley_core::error::ParleyError;

use crate::chunk::chunk_text;
use crate::embedding::DynEmbeddingService;
use crate::index::VectorIndex;

/// A recalled passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub text: String,
    /// Cosine similarity to the query.
    pub relevance: f64,
}

/// Outcome of [`SemanticMemory::save_information`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSummary {
    pub stored: usize,
    pub deduplicated: usize,
}

/// Embedding-backed memory store keyed by collection name.
pub struct SemanticMemory {
    embedder: Arc<dyn DynEmbeddingService>,
    collections: DashMap<String, VectorIndex>,
    chunk_size: usize,
    chunk_overlap: usize,
    dedup_threshold: f64,
}

impl SemanticMemory {
    pub fn new(embedder: Arc<dyn DynEmbeddingService>) -> Self {
        Self::with_retrieval_config(embedder, &RetrievalConfig::default())
    }

    pub fn with_retrieval_config(
        embedder: Arc<dyn DynEmbeddingService>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            collections: DashMap::new(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            dedup_threshold: 0.99,
        }
    }

    /// Chunk, embed and store `text` under `collection`.
    ///
    /// Chunk ids are `{id}-{n}`. A new collection becomes visible only after
    /// every chunk has been embedded, so a failed first save leaves nothing
    /// behind. Saving an empty text registers an empty collection.
    pub async fn save_information(
        &self,
        collection: &str,
        id: &str,
        text: &str,
    ) -> Result<SaveSummary, ParleyError> {
        let chunks = chunk_text(text, self.chunk_size, self.chunk_overlap);

        let staged = match self.collections.get(collection) {
            Some(existing) => existing.clone(),
            None => VectorIndex::new(),
        };
        // Near-duplicate check only looks at chunks from this save.
        let incoming = VectorIndex::new();
        let mut summary = SaveSummary::default();

        for (n, chunk) in chunks.iter().enumerate() {
            let embedding = self.embedder.embed_boxed(chunk).await?;

            let near_duplicate = incoming
                .search(&embedding, 1)?
                .first()
                .is_some_and(|hit| hit.score >= self.dedup_threshold);
            if near_duplicate {
                debug!(collection, chunk = n, "Chunk deduplicated");
                summary.deduplicated += 1;
                continue;
            }

            incoming.insert(format!("{}-{}", id, n), embedding.clone(), chunk.clone())?;
            staged.insert(format!("{}-{}", id, n), embedding, chunk.clone())?;
            summary.stored += 1;
        }

        self.collections
            .entry(collection.to_string())
            .or_insert(staged);

        info!(
            collection,
            stored = summary.stored,
            deduplicated = summary.deduplicated,
            "Saved information to memory"
        );
        Ok(summary)
    }

    pub fn has_collection(&self, collection: &str) -> bool {
        self.collections.contains_key(collection)
    }

    /// Collection names, sorted.
    pub fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Up to `limit` passages from `collection` with relevance ≥ `min_relevance`,
    /// most relevant first. An unknown collection recalls nothing.
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        min_relevance: f64,
    ) -> Result<Vec<MemoryRecord>, ParleyError> {
        let Some(index) = self.collections.get(collection).map(|e| e.clone()) else {
            debug!(collection, "Search against unknown collection");
            return Ok(Vec::new());
        };

        let embedding = self.embedder.embed_boxed(query).await?;
        let records = index
            .search(&embedding, limit)?
            .into_iter()
            .filter(|hit| hit.score >= min_relevance)
            .map(|hit| MemoryRecord {
                id: hit.id,
                text: hit.text,
                relevance: hit.score,
            })
            .collect();
        Ok(records)
    }

    /// Number of chunks stored under `collection`.
    pub fn collection_len(&self, collection: &str) -> usize {
        self.collections.get(collection).map(|e| e.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for SemanticMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticMemory")
            .field("collections", &self.collections.len())
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;

    const HANDBOOK: &str = "Employees receive twenty five days of annual leave per year. \
        Leave requests are submitted through the HR portal. \
        The office opens at eight in the morning and closes at six. \
        Parking permits are issued by facilities on the ground floor.";

    fn make_memory(chunk_size: usize) -> SemanticMemory {
        let config = RetrievalConfig {
            chunk_size,
            chunk_overlap: 0,
            ..RetrievalConfig::default()
        };
        SemanticMemory::with_retrieval_config(Arc::new(HashEmbedding::new()), &config)
    }

    #[tokio::test]
    async fn test_save_creates_collection() {
        let memory = make_memory(80);
        assert!(!memory.has_collection("handbook"));

        let summary = memory.save_information("handbook", "handbook", HANDBOOK).await.unwrap();
        assert!(summary.stored >= 3);
        assert!(memory.has_collection("handbook"));
        assert_eq!(memory.collection_len("handbook"), summary.stored);
        assert_eq!(memory.collections(), vec!["handbook".to_string()]);
    }

    #[tokio::test]
    async fn test_search_ranks_relevant_passage_first() {
        let memory = make_memory(80);
        memory.save_information("handbook", "handbook", HANDBOOK).await.unwrap();

        let records = memory
            .search("handbook", "how many days of annual leave", 2, 0.0)
            .await
            .unwrap();
        assert!(!records.is_empty());
        assert!(records[0].text.contains("annual leave"));
        assert!(records.len() <= 2);
    }

    #[tokio::test]
    async fn test_search_min_relevance_filters() {
        let memory = make_memory(80);
        memory.save_information("handbook", "handbook", HANDBOOK).await.unwrap();

        let records = memory.search("handbook", "annual leave", 10, 1.01).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_search_unknown_collection_is_empty() {
        let memory = make_memory(80);
        let records = memory.search("missing", "anything", 5, 0.0).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let memory = make_memory(200);
        memory.save_information("a", "a", "apples and pears").await.unwrap();
        memory.save_information("b", "b", "trains and buses").await.unwrap();

        let records = memory.search("a", "trains", 5, 0.0).await.unwrap();
        assert!(records.iter().all(|r| r.id.starts_with("a-")));
        assert_eq!(memory.collections(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_repeated_chunks_deduplicated() {
        let memory = make_memory(31);
        let text = "Confidential page footer text. ".repeat(4);
        let summary = memory.save_information("doc", "doc", &text).await.unwrap();
        assert_eq!(summary.stored, 1);
        assert_eq!(summary.deduplicated, 3);
    }

    #[tokio::test]
    async fn test_empty_text_registers_empty_collection() {
        let memory = make_memory(80);
        let summary = memory.save_information("blank", "blank", "   ").await.unwrap();
        assert_eq!(summary, SaveSummary::default());
        assert!(memory.has_collection("blank"));
        assert_eq!(memory.collection_len("blank"), 0);
    }
}
