//! Parley Vector crate - embeddings, vector index, and semantic memory.
//!
//! Document subjects are chunked, embedded and stored per collection in
//! [`SemanticMemory`]; questions recall the most relevant passages by
//! cosine similarity.

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod memory;

pub use chunk::chunk_text;
pub use embedding::{ApiAuth, DynEmbeddingService, EmbeddingService, HashEmbedding, HttpEmbedding};
pub use index::{SearchHit, VectorIndex};
pub use memory::{MemoryRecord, SaveSummary, SemanticMemory};
