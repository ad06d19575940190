//! # docsage core
//!
//! Runtime-agnostic logic for docsage: the query model, validation,
//! capability traits (embedder, vector store, generator), retrieval,
//! answer synthesis, response assembly and the pipeline that composes them.
//!
//! This crate contains no tokio, no HTTP clients and no filesystem I/O.
//! Concrete capability clients live in the `docsage` app crate.

pub mod assemble;
pub mod chain;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod observe;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;
pub mod store;
pub mod synthesize;
pub mod validate;

pub use error::{
    ErrorCode, GenerationFailure, InvalidQuery, PipelineError, ProcessingFailure,
    RetrievalFailure,
};
pub use models::{Query, QueryResponse, RetrievedChunk, SourceReference};
pub use pipeline::{PipelineConfig, QueryPipeline};
