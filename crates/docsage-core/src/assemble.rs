//! Response assembly: cite the chunks and stamp the response.

use chrono::{SecondsFormat, Utc};
use tracing::warn;

use crate::models::{QueryResponse, RetrievedChunk, SourceReference};

/// Current UTC time as ISO-8601 with microseconds and a trailing `Z`.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn source_reference(chunk: &RetrievedChunk) -> SourceReference {
    let repo = chunk.repo_url().unwrap_or_default();
    let file_path = chunk.file_path().unwrap_or_default();
    if repo.is_empty() || file_path.is_empty() {
        warn!(repo, file_path, "retrieved chunk is missing citation metadata");
    }
    SourceReference {
        repo: repo.to_string(),
        file_path: file_path.to_string(),
        relevance_score: chunk.score.unwrap_or(0.0),
        chunk_text: Some(chunk.text.clone()),
    }
}

/// Packages an answer. Keeps the first `max_results` chunks in retrieval
/// order; never fails.
pub fn assemble(
    answer: String,
    chunks: &[RetrievedChunk],
    query: &str,
    max_results: usize,
) -> QueryResponse {
    QueryResponse {
        answer,
        sources: chunks
            .iter()
            .take(max_results)
            .map(source_reference)
            .collect(),
        timestamp: utc_timestamp(),
        query: query.to_string(),
    }
}
