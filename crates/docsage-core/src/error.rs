//! Error taxonomy for the query pipeline.
//!
//! Each layer has its own error type. The orchestrator folds retrieval and
//! generation failures into [`ProcessingFailure`] so callers only ever see
//! the two kinds of [`PipelineError`]: the caller's fault or ours.

use std::fmt;

use thiserror::Error;

/// Why a raw query was rejected by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidQuery {
    #[error("Query must be a string")]
    WrongType,
    #[error("Query cannot be empty")]
    Empty,
    /// `length` is the trimmed length in characters.
    #[error("Query is too long (maximum {max} characters)")]
    TooLong { length: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum RetrievalFailure {
    #[error("retrieval depth must be at least 1")]
    InvalidDepth,
    #[error("failed to embed query")]
    Embedding(#[source] anyhow::Error),
    #[error("similarity search failed")]
    Store(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum GenerationFailure {
    #[error("language model call failed")]
    Model(#[source] anyhow::Error),
}

/// A retrieval or generation failure, as seen from outside the chain.
#[derive(Debug, Error)]
pub enum ProcessingFailure {
    #[error(transparent)]
    Retrieval(#[from] RetrievalFailure),
    #[error(transparent)]
    Generation(#[from] GenerationFailure),
    /// Failure raised by a custom [`AnswerChain`](crate::chain::AnswerChain).
    #[error(transparent)]
    Other(anyhow::Error),
}

impl ProcessingFailure {
    /// Renders the failure together with its whole cause chain,
    /// e.g. `similarity search failed: connection refused`.
    pub fn describe(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidQuery(#[from] InvalidQuery),
    #[error(transparent)]
    Processing(#[from] ProcessingFailure),
}

impl PipelineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::InvalidQuery(_) => ErrorCode::InvalidQuery,
            PipelineError::Processing(_) => ErrorCode::ProcessingError,
        }
    }
}

/// Machine-readable error codes carried in error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidQuery,
    InvalidRequest,
    ConfigurationError,
    ProcessingError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidQuery => "INVALID_QUERY",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::ProcessingError => "PROCESSING_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code used when this error ends a request.
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::InvalidQuery | ErrorCode::InvalidRequest => 400,
            ErrorCode::ConfigurationError
            | ErrorCode::ProcessingError
            | ErrorCode::InternalError => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
