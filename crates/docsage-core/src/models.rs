//! Data types flowing through the query pipeline.
//!
//! | Type | Produced by | Consumed by |
//! |------|-------------|-------------|
//! | [`Query`] | [`validate`](crate::validate) | retriever, synthesizer, assembler |
//! | [`RetrievedChunk`] | [`VectorStore`](crate::store::VectorStore) | synthesizer, assembler |
//! | [`SourceReference`] | [`assemble`](crate::assemble) | response body |
//! | [`QueryResponse`] | [`assemble`](crate::assemble) | transport layer |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A validated user question.
///
/// Only the validator constructs this type. It keeps the caller's text as
/// given (surrounding whitespace included): the trimmed form is used for
/// length checks only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    pub(crate) fn new_unchecked(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A documentation chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    /// Free-form metadata; `repo_url` and `file_path` are the keys used for citations.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Similarity score reported by the store, higher is more relevant.
    #[serde(default)]
    pub score: Option<f64>,
}

impl RetrievedChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Map::new(),
            score: None,
        }
    }

    /// Builder helper setting `repo_url` and `file_path`.
    pub fn with_source(mut self, repo_url: impl Into<String>, file_path: impl Into<String>) -> Self {
        self.metadata
            .insert("repo_url".to_string(), Value::String(repo_url.into()));
        self.metadata
            .insert("file_path".to_string(), Value::String(file_path.into()));
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn repo_url(&self) -> Option<&str> {
        self.metadata.get("repo_url").and_then(Value::as_str)
    }

    pub fn file_path(&self) -> Option<&str> {
        self.metadata.get("file_path").and_then(Value::as_str)
    }
}

/// Citation for one chunk used to produce an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    pub repo: String,
    pub file_path: String,
    pub relevance_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_text: Option<String>,
}

/// Final result of a successful query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceReference>,
    /// UTC, ISO-8601 with a trailing `Z`.
    pub timestamp: String,
    pub query: String,
}
