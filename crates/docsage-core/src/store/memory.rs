//! In-memory [`VectorStore`] for tests and local runs.
//!
//! Vector search is brute-force cosine similarity over every stored entry.
//! Scores are mapped from `[-1, 1]` into `[0, 1]` so they satisfy the
//! non-negative relevance contract.

use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::VectorStore;
use crate::embedding::cosine_similarity;
use crate::models::RetrievedChunk;

struct StoredChunk {
    chunk: RetrievedChunk,
    vector: Vec<f32>,
}

pub struct InMemoryStore {
    dims: Option<usize>,
    entries: RwLock<Vec<StoredChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            dims: None,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Store that rejects vectors whose length differs from `dims`.
    pub fn with_dims(dims: usize) -> Self {
        Self {
            dims: Some(dims),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Adds a chunk. Any score already set on `chunk` is replaced at search time.
    pub fn insert(&self, chunk: RetrievedChunk, vector: Vec<f32>) -> Result<()> {
        if let Some(dims) = self.dims {
            if vector.len() != dims {
                bail!(
                    "vector has {} dimensions, store expects {}",
                    vector.len(),
                    dims
                );
            }
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push(StoredChunk { chunk, vector });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn similarity_search(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        if let Some(dims) = self.dims {
            if vector.len() != dims {
                bail!(
                    "query vector has {} dimensions, store expects {}",
                    vector.len(),
                    dims
                );
            }
        }

        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<(f64, &StoredChunk)> = entries
            .iter()
            .map(|entry| {
                let cos = cosine_similarity(vector, &entry.vector) as f64;
                ((1.0 + cos) / 2.0, entry)
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| RetrievedChunk {
                score: Some(score),
                ..entry.chunk.clone()
            })
            .collect())
    }
}
