//! Chat model clients.
//!
//! | Provider | Endpoint | Answer location |
//! |----------|----------|-----------------|
//! | [`OpenAiChat`] | `POST /v1/chat/completions` | `choices[0].message.content` |
//! | [`OllamaChat`] | `POST /api/chat` | `message.content` |
//!
//! When the answer is not where it should be, the whole reply is handed
//! back as [`ModelReply::Raw`] and the synthesizer coerces it to text.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use docsage_core::generation::{GenerationParams, Generator, ModelReply};

use crate::config::GenerationConfig;
use crate::http::{build_client, send_json, RetryPolicy};

const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";

pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    params: GenerationParams,
    retry: RetryPolicy,
}

impl OpenAiChat {
    pub fn new(config: &GenerationConfig, params: GenerationParams, api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_URL.to_string()),
            api_key,
            model: config.model.clone(),
            params,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Generator for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<ModelReply> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.params.temperature,
            "max_tokens": self.params.max_tokens,
        });
        let reply = send_json("OpenAI API", self.retry, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        Ok(openai_reply(reply))
    }
}

fn openai_reply(reply: Value) -> ModelReply {
    match reply
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        Some(text) => ModelReply::Text(text.to_string()),
        None => ModelReply::Raw(reply),
    }
}

pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
    params: GenerationParams,
    retry: RetryPolicy,
}

impl OllamaChat {
    pub fn new(config: &GenerationConfig, params: GenerationParams) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string()),
            model: config.model.clone(),
            params,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Generator for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<ModelReply> {
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
            "options": {
                "temperature": self.params.temperature,
                "num_predict": self.params.max_tokens,
            },
        });
        let reply = send_json("Ollama API", self.retry, || self.client.post(&url).json(&body)).await?;
        Ok(ollama_reply(reply))
    }
}

fn ollama_reply(reply: Value) -> ModelReply {
    match reply.pointer("/message/content").and_then(Value::as_str) {
        Some(text) => ModelReply::Text(text.to_string()),
        None => ModelReply::Raw(reply),
    }
}

/// Create the [`Generator`] selected by `generation.provider`.
pub fn create_generator(
    config: &GenerationConfig,
    params: GenerationParams,
) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
            Ok(Arc::new(OpenAiChat::new(config, params, api_key)?))
        }
        "ollama" => Ok(Arc::new(OllamaChat::new(config, params)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(provider: &str, url: &str) -> GenerationConfig {
        GenerationConfig {
            provider: provider.to_string(),
            model: "test-llm".to_string(),
            url: Some(url.to_string()),
            ..GenerationConfig::default()
        }
    }

    fn params() -> GenerationParams {
        GenerationParams {
            temperature: 0.5,
            max_tokens: 256,
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_openai_chat_request_and_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "test-llm",
                "messages": [{"role": "user", "content": "PROMPT"}],
                "temperature": 0.5,
                "max_tokens": 256,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Use backoff."}}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let chat = OpenAiChat::new(&config("openai", &server.uri()), params(), "sk-test".into())
            .unwrap()
            .with_retry(fast());
        let reply = chat.complete("PROMPT").await.unwrap();
        assert_eq!(reply, ModelReply::Text("Use backoff.".into()));
    }

    #[tokio::test]
    async fn test_ollama_chat_request_and_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "test-llm",
                "stream": false,
                "options": {"num_predict": 256},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "Local answer."},
                "done": true,
            })))
            .mount(&server)
            .await;

        let chat = OllamaChat::new(&config("ollama", &server.uri()), params())
            .unwrap()
            .with_retry(fast());
        let reply = chat.complete("PROMPT").await.unwrap();
        assert_eq!(reply.into_text(), "Local answer.");
    }

    #[test]
    fn test_unexpected_shapes_become_raw() {
        let odd = json!({"choices": [{"text": "legacy completion"}]});
        assert_eq!(openai_reply(odd.clone()), ModelReply::Raw(odd));

        let non_string = json!({"message": {"content": ["a", "b"]}});
        assert_eq!(ollama_reply(non_string.clone()), ModelReply::Raw(non_string));
    }

    #[tokio::test]
    async fn test_server_error_surfaces_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .expect(2)
            .mount(&server)
            .await;

        let chat = OllamaChat::new(&config("ollama", &server.uri()), params())
            .unwrap()
            .with_retry(fast());
        let err = chat.complete("PROMPT").await.unwrap_err();
        assert!(err.to_string().contains("model crashed"));
    }
}
