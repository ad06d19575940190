//! Configuration loading.
//!
//! Configuration comes from an optional TOML file, then environment
//! variables override individual values:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `VECTOR_STORE_ENDPOINT` | `vector_store.endpoint` |
//! | `VECTOR_STORE_USERNAME` / `VECTOR_STORE_PASSWORD` | `vector_store.username` / `.password` |
//! | `INDEX_NAME` | `vector_store.index_name` |
//! | `EMBEDDING_MODEL` | `embedding.model` |
//! | `LLM_MODEL` | `generation.model` |
//! | `RETRIEVAL_K` | `retrieval.k` |
//! | `MAX_RESULTS` | `retrieval.max_results` |
//! | `ENVIRONMENT` | `metrics.environment` |
//!
//! A missing vector store endpoint does not fail loading. The service
//! starts and answers every request with `CONFIGURATION_ERROR` until it is
//! configured; see [`ConfigError`].

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use docsage_core::generation::GenerationParams;
use docsage_core::pipeline::PipelineConfig;
use docsage_core::prompt::PromptTemplate;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default = "default_vector_field")]
    pub vector_field: String,
    #[serde(default = "default_text_field")]
    pub text_field: String,
    #[serde(default = "default_metadata_field")]
    pub metadata_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default = "default_store_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            index_name: default_index_name(),
            vector_field: default_vector_field(),
            text_field: default_text_field(),
            metadata_field: default_metadata_field(),
            username: None,
            password: None,
            max_retries: default_store_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_index_name() -> String {
    "docs-index".to_string()
}
fn default_vector_field() -> String {
    "embedding".to_string()
}
fn default_text_field() -> String {
    "text".to_string()
}
fn default_metadata_field() -> String {
    "metadata".to_string()
}
fn default_store_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL override (OpenAI-compatible gateway, remote Ollama).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            url: None,
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    GenerationParams::default().temperature
}
fn default_max_tokens() -> u32 {
    GenerationParams::default().max_tokens
}
fn default_generation_retries() -> u32 {
    3
}
fn default_generation_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    /// Defaults to `k`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            max_results: None,
            prompt_template: None,
        }
    }
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            namespace: default_namespace(),
            environment: default_environment(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}
fn default_namespace() -> String {
    "docsage".to_string()
}
fn default_environment() -> String {
    "dev".to_string()
}
fn default_batch_size() -> usize {
    20
}

impl Config {
    /// Applies environment overrides read through `lookup`.
    ///
    /// Empty values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("VECTOR_STORE_ENDPOINT") {
            self.vector_store.endpoint = Some(v);
        }
        if let Some(v) = get("VECTOR_STORE_USERNAME") {
            self.vector_store.username = Some(v);
        }
        if let Some(v) = get("VECTOR_STORE_PASSWORD") {
            self.vector_store.password = Some(v);
        }
        if let Some(v) = get("INDEX_NAME") {
            self.vector_store.index_name = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = get("RETRIEVAL_K") {
            self.retrieval.k = v
                .trim()
                .parse()
                .with_context(|| format!("RETRIEVAL_K must be a positive integer, got '{}'", v))?;
        }
        if let Some(v) = get("MAX_RESULTS") {
            self.retrieval.max_results = Some(v.trim().parse().with_context(|| {
                format!("MAX_RESULTS must be a non-negative integer, got '{}'", v)
            })?);
        }
        if let Some(v) = get("ENVIRONMENT") {
            self.metrics.environment = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.k < 1 {
            bail!("retrieval.k must be >= 1");
        }
        if let Some(template) = &self.retrieval.prompt_template {
            PromptTemplate::parse(template).context("retrieval.prompt_template is invalid")?;
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }
        if self.embedding.is_enabled() && self.embedding.dims == 0 {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                self.embedding.provider
            );
        }

        match self.generation.provider.as_str() {
            "openai" | "ollama" => {}
            other => bail!(
                "Unknown generation provider: '{}'. Must be openai or ollama.",
                other
            ),
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            bail!("generation.temperature must be in [0.0, 2.0]");
        }
        if self.generation.max_tokens == 0 {
            bail!("generation.max_tokens must be > 0");
        }

        if self.metrics.batch_size == 0 {
            bail!("metrics.batch_size must be > 0");
        }
        Ok(())
    }

    /// Pipeline settings derived from this configuration.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::new(self.retrieval.k);
        config.max_results = self.retrieval.max_results.unwrap_or(self.retrieval.k);
        config.generation = GenerationParams {
            temperature: self.generation.temperature,
            max_tokens: self.generation.max_tokens,
        };
        if let Some(template) = &self.retrieval.prompt_template {
            config.prompt_template = PromptTemplate::parse(template)?;
        }
        Ok(config)
    }

    /// The configured vector store endpoint, or the error every request
    /// should report while it is missing.
    pub fn require_endpoint(&self) -> Result<&str, ConfigError> {
        self.vector_store
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(ConfigError::MissingEndpoint)
    }
}

/// A configuration problem that keeps the service from answering queries.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Vector store endpoint not configured")]
    MissingEndpoint,
    #[error("Failed to initialize {component}")]
    Client {
        component: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ConfigError {
    /// Remediation hint sent as `error.details`.
    pub fn details(&self) -> String {
        match self {
            ConfigError::MissingEndpoint => {
                "VECTOR_STORE_ENDPOINT environment variable is required".to_string()
            }
            ConfigError::Client { source, .. } => format!("{:#}", source),
        }
    }
}

/// Loads configuration from `path` (if given), then the process
/// environment, then validates it.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

pub fn load_config_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str::<Config>(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    config.apply_env(lookup)?;
    config.validate()?;
    Ok(config)
}
