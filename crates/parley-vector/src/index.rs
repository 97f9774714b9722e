//! In-memory vector index with brute-force cosine similarity search.
//!
//! One index holds the chunks of one collection. Search is O(n), which is
//! fine for the few thousand chunks a handful of reference documents yield.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use parley_core::error::ParleyError;

/// A single hit returned from a vector search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    /// Cosine similarity score (-1.0 to 1.0).
    pub score: f64,
    pub text: String,
}

#[derive(Debug, Clone)]
struct VectorEntry {
    embedding: Vec<f32>,
    text: String,
}

/// In-memory vector index using brute-force cosine similarity.
///
/// Cloning shares the underlying entries.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: Arc<RwLock<HashMap<String, VectorEntry>>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a vector and its source text. Overwrites any entry with the same id.
    pub fn insert(
        &self,
        id: impl Into<String>,
        embedding: Vec<f32>,
        text: impl Into<String>,
    ) -> Result<(), ParleyError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| ParleyError::Search(format!("Lock poisoned: {}", e)))?;
        entries.insert(
            id.into(),
            VectorEntry {
                embedding,
                text: text.into(),
            },
        );
        Ok(())
    }

    /// The `k` nearest entries to `query`, by descending cosine similarity.
    ///
    /// Ties are broken by id so results are stable across calls.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, ParleyError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| ParleyError::Search(format!("Lock poisoned: {}", e)))?;

        let mut scored: Vec<SearchHit> = entries
            .iter()
            .map(|(id, entry)| SearchHit {
                id: id.clone(),
                score: cosine_similarity(query, &entry.embedding),
                text: entry.text.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);

        Ok(scored)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Cosine similarity of two vectors. 0.0 on length mismatch or zero magnitude.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_search() {
        let index = VectorIndex::new();
        index.insert("a", vec![1.0, 0.0, 0.0], "alpha").unwrap();
        index.insert("b", vec![0.0, 1.0, 0.0], "beta").unwrap();
        assert_eq!(index.len(), 2);

        let hits = index.search(&[1.0, 0.1, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].text, "alpha");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_search_respects_k_limit() {
        let index = VectorIndex::new();
        for i in 0..10 {
            index.insert(format!("c{}", i), vec![1.0f32; 8], "x").unwrap();
        }
        assert_eq!(index.search(&[1.0f32; 8], 3).unwrap().len(), 3);
    }

    #[test]
    fn test_equal_scores_order_by_id() {
        let index = VectorIndex::new();
        index.insert("b", vec![1.0f32; 4], "second").unwrap();
        index.insert("a", vec![1.0f32; 4], "first").unwrap();
        let hits = index.search(&[1.0f32; 4], 2).unwrap();
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "b");
    }

    #[test]
    fn test_search_empty_index() {
        let index = VectorIndex::new();
        assert!(index.search(&[1.0f32; 4], 10).unwrap().is_empty());
    }

    #[test]
    fn test_insert_overwrites() {
        let index = VectorIndex::new();
        index.insert("a", vec![1.0f32; 4], "old").unwrap();
        index.insert("a", vec![1.0f32; 4], "new").unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.search(&[1.0f32; 4], 1).unwrap()[0].text, "new");
    }

    #[test]
    fn test_clone_shares_entries() {
        let index = VectorIndex::new();
        let other = index.clone();
        index.insert("a", vec![1.0f32; 4], "x").unwrap();
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0f32; 100];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let mut a = vec![0.0f32; 100];
        let mut b = vec![0.0f32; 100];
        a[0] = 1.0;
        b[1] = 1.0;
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[0.0f32; 10], &[1.0f32; 10]), 0.0);
        assert_eq!(cosine_similarity(&[1.0f32; 10], &[1.0f32; 20]), 0.0);
    }
}
