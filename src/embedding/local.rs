//! In-process embeddings via fastembed.
//!
//! The model is downloaded from Hugging Face on first use and kept loaded
//! for the life of the embedder.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use docsage_core::embedding::Embedder;

use crate::config::EmbeddingConfig;

pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    model: fastembed::EmbeddingModel,
    loaded: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            model_name: config.model.clone(),
            dims: config.dims,
            model: fastembed_model(&config.model)?,
            loaded: Arc::new(Mutex::new(None)),
        })
    }
}

fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5",
            other
        ),
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let loaded = self.loaded.clone();
        let model = self.model.clone();
        let text = text.to_string();

        let vector = tokio::task::spawn_blocking(move || -> Result<Vec<f32>> {
            let mut guard = loaded.lock().unwrap_or_else(|e| e.into_inner());
            if guard.is_none() {
                let embedding = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(false),
                )
                .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(embedding);
            }
            let Some(embedding) = guard.as_mut() else {
                bail!("local embedding model is not loaded");
            };
            embedding
                .embed(vec![text], None)
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("Local embedding returned no vectors"))
        })
        .await??;

        super::check_dims(vector, self.dims)
    }
}
