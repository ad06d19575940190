//! # docsage
//!
//! Grounded question answering over a project's documentation. A question
//! is embedded, the nearest documentation chunks are fetched from a vector
//! index, a language model answers from those chunks only, and the answer
//! is returned with citations.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────────────────────────────────┐
//! │  server   │──▶│ handler::QueryService                    │
//! │ sage ask  │   │   parse body ▶ config check ▶ pipeline   │
//! └───────────┘   └───────────────┬──────────────────────────┘
//!                                 ▼
//!        docsage_core::QueryPipeline (validate ▶ retrieve ▶ generate ▶ assemble)
//!                 │               │                │
//!            embedding        opensearch       generation
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`embedding`] | OpenAI / Ollama / local query embedders |
//! | [`generation`] | OpenAI / Ollama chat clients |
//! | [`opensearch`] | OpenSearch k-NN vector store |
//! | [`http`] | Shared retrying HTTP helper |
//! | [`handler`] | Framework-independent request handling |
//! | [`server`] | axum HTTP server |
//! | [`metrics`] | Batched query metrics |
//!
//! The pipeline itself (models, validation, retrieval, synthesis, assembly)
//! lives in the `docsage-core` crate and is re-exported as [`core`].

pub use docsage_core as core;

pub mod config;
pub mod embedding;
pub mod generation;
pub mod handler;
pub mod http;
pub mod metrics;
pub mod opensearch;
pub mod server;
