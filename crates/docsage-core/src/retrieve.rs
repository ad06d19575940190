//! Query retrieval: embed the question, then ask the store for neighbours.

use std::sync::Arc;

use anyhow::anyhow;
use tracing::debug;

use crate::embedding::Embedder;
use crate::error::RetrievalFailure;
use crate::models::{Query, RetrievedChunk};
use crate::store::VectorStore;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Returns at most `k` chunks in the order the store ranked them.
    ///
    /// An empty result is not an error: the synthesizer handles a question
    /// with no supporting documentation.
    pub async fn retrieve(
        &self,
        query: &Query,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalFailure> {
        if k == 0 {
            return Err(RetrievalFailure::InvalidDepth);
        }

        let vector = self
            .embedder
            .embed(query.as_str())
            .await
            .map_err(RetrievalFailure::Embedding)?;
        if vector.len() != self.embedder.dims() {
            return Err(RetrievalFailure::Embedding(anyhow!(
                "{} returned {} dimensions, expected {}",
                self.embedder.model_name(),
                vector.len(),
                self.embedder.dims()
            )));
        }
        debug!(
            model = self.embedder.model_name(),
            dims = vector.len(),
            "embedded query"
        );

        let mut chunks = self
            .store
            .similarity_search(&vector, k)
            .await
            .map_err(RetrievalFailure::Store)?;
        chunks.truncate(k);
        debug!(count = chunks.len(), k, "retrieved chunks");
        Ok(chunks)
    }
}
