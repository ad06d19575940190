//! The query pipeline: validate, retrieve and generate, assemble.
//!
//! ```text
//! Validating ──▶ Retrieving ──▶ Synthesizing ──▶ Assembling ──▶ Done
//!     │              │               │
//!     └──────────────┴───────────────┴──▶ Failed
//! ```
//!
//! Validation failures surface as [`PipelineError::InvalidQuery`]; anything
//! that goes wrong while retrieving or generating surfaces as
//! [`PipelineError::Processing`]. Assembly cannot fail. There are no
//! retries at this level.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::assemble::assemble;
use crate::chain::{AnswerChain, RetrievalChain};
use crate::embedding::Embedder;
use crate::error::{PipelineError, ProcessingFailure};
use crate::generation::{GenerationParams, Generator};
use crate::models::QueryResponse;
use crate::observe::{notify, NoopObserver, PipelineEvent, PipelineObserver};
use crate::prompt::PromptTemplate;
use crate::retrieve::Retriever;
use crate::store::VectorStore;
use crate::synthesize::Synthesizer;
use crate::validate::validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Retrieving,
    Synthesizing,
    Assembling,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Retrieving => "retrieving",
            Stage::Synthesizing => "synthesizing",
            Stage::Assembling => "assembling",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

fn enter(stage: Stage) {
    debug!(%stage, "pipeline stage");
}

impl PipelineError {
    /// The stage the request was in when it failed.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InvalidQuery(_) => Stage::Validating,
            PipelineError::Processing(ProcessingFailure::Retrieval(_)) => Stage::Retrieving,
            PipelineError::Processing(_) => Stage::Synthesizing,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of chunks fetched per query (and given to the model).
    pub retrieval_k: usize,
    /// Default cap on cited sources.
    pub max_results: usize,
    /// Handed to generator clients when they are built.
    pub generation: GenerationParams,
    pub prompt_template: PromptTemplate,
}

impl PipelineConfig {
    /// Defaults with `max_results` equal to `retrieval_k`.
    pub fn new(retrieval_k: usize) -> Self {
        Self {
            retrieval_k,
            max_results: retrieval_k,
            generation: GenerationParams::default(),
            prompt_template: PromptTemplate::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval_k < 1 {
            bail!("retrieval_k must be >= 1");
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

pub struct QueryPipeline {
    config: PipelineConfig,
    chain: Arc<dyn AnswerChain>,
    observer: Arc<dyn PipelineObserver>,
}

impl QueryPipeline {
    /// Builds the standard retrieve-then-generate pipeline.
    pub fn new(
        config: PipelineConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let chain = RetrievalChain::new(
            Retriever::new(embedder, store),
            Synthesizer::new(generator, config.prompt_template.clone()),
        );
        Self::with_chain(config, Arc::new(chain))
    }

    pub fn with_chain(config: PipelineConfig, chain: Arc<dyn AnswerChain>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            chain,
            observer: Arc::new(NoopObserver),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn observer(&self) -> &Arc<dyn PipelineObserver> {
        &self.observer
    }

    /// Answers a raw query value.
    ///
    /// `max_results` overrides the configured source cap for this call only.
    pub async fn answer(
        &self,
        input: &Value,
        max_results: Option<usize>,
    ) -> Result<QueryResponse, PipelineError> {
        let max_results = max_results.unwrap_or(self.config.max_results);
        let span = info_span!("query", k = self.config.retrieval_k, max_results);
        let started = Instant::now();

        let result = self.run(input, max_results).instrument(span).await;

        let latency = started.elapsed();
        match &result {
            Ok(response) => {
                info!(
                    sources = response.sources.len(),
                    latency_ms = latency.as_millis() as u64,
                    "query answered"
                );
                notify(self.observer.as_ref(), PipelineEvent::QueryProcessed { latency });
            }
            Err(e) => {
                match e {
                    PipelineError::InvalidQuery(_) => {
                        warn!(stage = %e.stage(), error = %e, "query rejected")
                    }
                    PipelineError::Processing(failure) => {
                        warn!(stage = %e.stage(), error = %failure.describe(), "query failed")
                    }
                }
                notify(
                    self.observer.as_ref(),
                    PipelineEvent::QueryFailed {
                        code: e.code(),
                        latency,
                    },
                );
            }
        }
        result
    }

    async fn run(&self, input: &Value, max_results: usize) -> Result<QueryResponse, PipelineError> {
        enter(Stage::Validating);
        let query = validate(input)?;

        enter(Stage::Retrieving);
        let output = self.chain.run(&query, self.config.retrieval_k).await?;
        notify(
            self.observer.as_ref(),
            PipelineEvent::DocumentsRetrieved {
                count: output.chunks.len(),
                latency: output.retrieval_time,
            },
        );
        notify(
            self.observer.as_ref(),
            PipelineEvent::ModelInvoked {
                latency: output.generation_time,
            },
        );

        enter(Stage::Assembling);
        let response = assemble(output.answer, &output.chunks, query.as_str(), max_results);
        enter(Stage::Done);
        Ok(response)
    }
}
