//! The retrieve-then-generate step of the pipeline.
//!
//! [`AnswerChain`] is the seam between the orchestrator and the RAG
//! machinery: the orchestrator only needs an answer plus the chunks that
//! support it. [`RetrievalChain`] is the standard implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::ProcessingFailure;
use crate::models::{Query, RetrievedChunk};
use crate::retrieve::Retriever;
use crate::synthesize::Synthesizer;

#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutput {
    pub answer: String,
    /// Chunks in retrieval order, all of which were given to the model.
    pub chunks: Vec<RetrievedChunk>,
    pub retrieval_time: Duration,
    pub generation_time: Duration,
}

#[async_trait]
pub trait AnswerChain: Send + Sync {
    async fn run(&self, query: &Query, k: usize) -> Result<ChainOutput, ProcessingFailure>;
}

pub struct RetrievalChain {
    retriever: Retriever,
    synthesizer: Synthesizer,
}

impl RetrievalChain {
    pub fn new(retriever: Retriever, synthesizer: Synthesizer) -> Self {
        Self {
            retriever,
            synthesizer,
        }
    }
}

#[async_trait]
impl AnswerChain for RetrievalChain {
    async fn run(&self, query: &Query, k: usize) -> Result<ChainOutput, ProcessingFailure> {
        let started = Instant::now();
        let chunks = self.retriever.retrieve(query, k).await?;
        let retrieval_time = started.elapsed();

        let started = Instant::now();
        let answer = self.synthesizer.synthesize(query, &chunks).await?;
        let generation_time = started.elapsed();

        Ok(ChainOutput {
            answer,
            chunks,
            retrieval_time,
            generation_time,
        })
    }
}
