//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the only storage operation the query
//! pipeline needs: top-k similarity search. Index maintenance is done by
//! whatever populated the index.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::RetrievedChunk;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Returns up to `k` chunks most similar to `vector`, most similar first.
    async fn similarity_search(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>>;
}
