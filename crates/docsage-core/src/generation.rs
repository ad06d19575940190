//! Generative model capability.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// What a model call returned.
///
/// Chat APIs hand back a structured message, completion APIs hand back text,
/// and some wrappers hand back something else entirely. Clients decide
/// which branch applies; [`ModelReply::into_text`] turns either into the
/// answer string.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    Raw(Value),
}

impl ModelReply {
    pub fn into_text(self) -> String {
        match self {
            ModelReply::Text(text) => text,
            ModelReply::Raw(Value::String(text)) => text,
            ModelReply::Raw(other) => other.to_string(),
        }
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    /// Sends one prompt and returns the model's reply.
    async fn complete(&self, prompt: &str) -> Result<ModelReply>;
}

/// Sampling parameters passed to generator clients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}
