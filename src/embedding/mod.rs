//! Query embedders.
//!
//! Concrete [`Embedder`] implementations:
//! - **[`DisabledEmbedder`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAiEmbedder`]**: calls the OpenAI embeddings API (or a compatible gateway).
//! - **[`OllamaEmbedder`]**: calls an Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`**: runs a fastembed model in-process (feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//!
//! All network embedders share the retry strategy in [`crate::http`] and
//! reject vectors whose length differs from the configured `dims`.

#[cfg(feature = "local-embeddings-fastembed")]
mod local;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use docsage_core::embedding::Embedder;

use crate::config::EmbeddingConfig;
use crate::http::{build_client, send_json, RetryPolicy};

const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Embedder used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embeddings are disabled. Set [embedding].provider in the config.")
    }
}

fn check_dims(vector: Vec<f32>, dims: usize) -> Result<Vec<f32>> {
    if vector.len() != dims {
        bail!(
            "Embedding has {} dimensions but embedding.dims is {}",
            vector.len(),
            dims
        );
    }
    Ok(vector)
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

// ============ OpenAI ============

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    retry: RetryPolicy,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_URL.to_string()),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let json = send_json("OpenAI API", self.retry, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        check_dims(parse_openai_response(&json)?, self.dims)
    }
}

/// Extracts `data[0].embedding` from an OpenAI embeddings response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data[0].embedding"))?;
    Ok(to_f32_vec(embedding))
}

// ============ Ollama ============

pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    retry: RetryPolicy,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string()),
            model: config.model.clone(),
            dims: config.dims,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embed", self.url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let json = send_json("Ollama API", self.retry, || self.client.post(&url).json(&body)).await?;
        check_dims(parse_ollama_response(&json)?, self.dims)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?;
    Ok(to_f32_vec(embedding))
}

/// Create the [`Embedder`] selected by `embedding.provider`.
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] (reads `OPENAI_API_KEY`) |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
            Ok(Arc::new(OpenAiEmbedder::new(config, api_key)?))
        }
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
