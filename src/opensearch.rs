//! OpenSearch k-NN [`VectorStore`].
//!
//! Issues `POST {endpoint}/{index}/_search` with a `knn` query against the
//! configured vector field and maps each hit to a [`RetrievedChunk`]:
//!
//! | Hit field | Chunk field |
//! |-----------|-------------|
//! | `_score` | `score` |
//! | `_source.{text_field}` | `text` |
//! | `_source.{metadata_field}` | `metadata` |
//!
//! Indexes that store `repo_url`/`file_path` at the top level of `_source`
//! (no metadata object) are supported: every other source field becomes
//! metadata.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use docsage_core::models::RetrievedChunk;
use docsage_core::store::VectorStore;

use crate::config::VectorStoreConfig;
use crate::http::{build_client, send_json, RetryPolicy};

pub struct OpenSearchStore {
    client: reqwest::Client,
    endpoint: String,
    index: String,
    vector_field: String,
    text_field: String,
    metadata_field: String,
    auth: Option<(String, Option<String>)>,
    retry: RetryPolicy,
}

impl OpenSearchStore {
    pub fn new(endpoint: &str, config: &VectorStoreConfig) -> Result<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("https://{}", endpoint)
        };
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            endpoint,
            index: config.index_name.clone(),
            vector_field: config.vector_field.clone(),
            text_field: config.text_field.clone(),
            metadata_field: config.metadata_field.clone(),
            auth: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn search_body(&self, vector: &[f32], k: usize) -> Value {
        json!({
            "size": k,
            "_source": {"excludes": [self.vector_field]},
            "query": {
                "knn": {
                    self.vector_field.as_str(): {
                        "vector": vector,
                        "k": k,
                    }
                }
            }
        })
    }

    fn parse_hit(&self, hit: &Value) -> RetrievedChunk {
        let mut source = hit
            .get("_source")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let text = match source.remove(&self.text_field) {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        let metadata = match source.remove(&self.metadata_field) {
            Some(Value::Object(metadata)) => metadata,
            _ => {
                source.remove(&self.vector_field);
                source
            }
        };

        RetrievedChunk {
            text,
            metadata,
            score: hit.get("_score").and_then(Value::as_f64).map(|s| s.max(0.0)),
        }
    }
}

#[async_trait]
impl VectorStore for OpenSearchStore {
    async fn similarity_search(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let url = format!("{}/{}/_search", self.endpoint, self.index);
        let body = self.search_body(vector, k);

        let response = send_json("OpenSearch", self.retry, || {
            let request = self.client.post(&url).json(&body);
            match &self.auth {
                Some((user, password)) => request.basic_auth(user, password.as_ref()),
                None => request,
            }
        })
        .await?;

        let hits = response
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .context("Invalid OpenSearch response: missing hits.hits")?;
        debug!(index = %self.index, hits = hits.len(), k, "knn search");

        Ok(hits.iter().map(|hit| self.parse_hit(hit)).collect())
    }
}
