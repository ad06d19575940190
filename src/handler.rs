//! Request handling, independent of the HTTP framework.
//!
//! [`QueryService::handle_query`] takes a raw request body and returns a
//! complete [`HttpResponse`]. It is shared by the axum server, the `sage ask`
//! command and [`QueryService::handle_event`], which accepts API-gateway
//! style events (`{"body": "...", "queryStringParameters": {...}}`).
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "INVALID_QUERY", "message": "Query cannot be empty",
//!              "details": "Please provide a valid query string" },
//!   "timestamp": "2026-01-01T00:00:00.000000Z" }
//! ```
//!
//! | Code | Status | When |
//! |------|--------|------|
//! | `INVALID_REQUEST` | 400 | body is not a JSON object, bad `max_results` |
//! | `INVALID_QUERY` | 400 | query missing, not a string, empty or too long |
//! | `CONFIGURATION_ERROR` | 500 | vector store endpoint or a client is not configured |
//! | `PROCESSING_ERROR` | 500 | retrieval or generation failed |
//! | `INTERNAL_ERROR` | 500 | anything else |
//!
//! Checks run in that order: body, then configuration, then the pipeline.
//!
//! # Request IDs
//!
//! Every request runs inside a `request` span carrying a `request_id`: the
//! caller's `X-Request-Id` when given, otherwise a fresh UUID. The ID is
//! echoed back in the `X-Request-Id` response header.

use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info_span, warn, Instrument};
use uuid::Uuid;

use docsage_core::assemble::utc_timestamp;
use docsage_core::error::{ErrorCode, PipelineError};
use docsage_core::observe::{notify, NoopObserver, PipelineEvent, PipelineObserver};
use docsage_core::pipeline::QueryPipeline;

use crate::config::{Config, ConfigError};
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::metrics::{MetricsRecorder, TracingSink};
use crate::opensearch::OpenSearchStore;

const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parses the body; every response this module builds is JSON.
    pub fn json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.body)
    }
}

/// Per-request overrides supplied outside the body (e.g. the URL query string).
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOverrides {
    pub max_results: Option<usize>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
    timestamp: String,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// A request that ended before (or instead of) producing an answer.
struct Failure {
    code: ErrorCode,
    message: String,
    details: Option<String>,
}

impl Failure {
    fn new(code: ErrorCode, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Some(details.into()),
        }
    }

    fn from_pipeline(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidQuery(e) => Self::new(
                ErrorCode::InvalidQuery,
                e.to_string(),
                "Please provide a valid query string",
            ),
            PipelineError::Processing(e) => Self::new(
                ErrorCode::ProcessingError,
                "Failed to process query",
                e.describe(),
            ),
        }
    }

    fn internal(details: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalError,
            "An unexpected error occurred",
            details,
        )
    }

    fn into_response(self) -> HttpResponse {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.as_str(),
                message: self.message,
                details: self.details,
            },
            timestamp: utc_timestamp(),
        };
        // ErrorBody contains only strings.
        let body = serde_json::to_string(&body).unwrap_or_default();
        HttpResponse {
            status_code: self.code.status(),
            headers: vec![("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string())],
            body,
        }
    }
}

pub struct QueryService {
    pipeline: Result<Arc<QueryPipeline>, ConfigError>,
    observer: Arc<dyn PipelineObserver>,
}

impl QueryService {
    pub fn new(pipeline: QueryPipeline) -> Self {
        let observer = pipeline.observer().clone();
        Self {
            pipeline: Ok(Arc::new(pipeline)),
            observer,
        }
    }

    /// A service that answers every request with `CONFIGURATION_ERROR`.
    pub fn unconfigured(err: ConfigError) -> Self {
        Self {
            pipeline: Err(err),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Builds the production pipeline (OpenSearch, configured embedder and
    /// generator, metrics). Client construction failures are kept and
    /// reported per request rather than aborting startup.
    pub fn from_config(config: &Config) -> Self {
        let observer: Arc<dyn PipelineObserver> = if config.metrics.enabled {
            Arc::new(MetricsRecorder::new(&config.metrics, Arc::new(TracingSink)))
        } else {
            Arc::new(NoopObserver)
        };

        match build_pipeline(config) {
            Ok(pipeline) => Self::new(pipeline.with_observer(observer.clone())),
            Err(e) => {
                error!(error = %e, details = %e.details(), "service is not configured");
                Self::unconfigured(e).with_observer(observer)
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.pipeline.is_ok()
    }

    pub async fn handle_query(&self, raw_body: &str, overrides: QueryOverrides) -> HttpResponse {
        in_request(None, self.respond(raw_body, overrides)).await
    }

    /// Entry point for the HTTP server: the body as received and the raw URL
    /// query string. `max_results` in the query string beats the body field.
    pub async fn handle_http(
        &self,
        raw_body: &[u8],
        raw_query: Option<&str>,
        request_id: Option<&str>,
    ) -> HttpResponse {
        in_request(request_id, async {
            let body = match std::str::from_utf8(raw_body) {
                Ok(body) => body,
                Err(e) => {
                    return self.reject(Failure::new(
                        ErrorCode::InvalidRequest,
                        "Invalid JSON in request body",
                        e.to_string(),
                    ))
                }
            };
            let overrides = match raw_query.map(parse_query_string).transpose() {
                Ok(overrides) => overrides.unwrap_or_default(),
                Err(failure) => return self.reject(failure),
            };
            self.respond(body, overrides).await
        })
        .await
    }

    /// Answers a request whose body could not be read at all.
    pub async fn handle_unreadable_body(
        &self,
        reason: &str,
        request_id: Option<&str>,
    ) -> HttpResponse {
        in_request(request_id, async {
            self.reject(Failure::new(
                ErrorCode::InvalidRequest,
                "Could not read request body",
                reason,
            ))
        })
        .await
    }

    async fn respond(&self, raw_body: &str, overrides: QueryOverrides) -> HttpResponse {
        let started = Instant::now();
        match self.process(raw_body, overrides).await {
            Ok(response) => response,
            Err((failure, reported)) => {
                if failure.code.status() >= 500 {
                    error!(code = %failure.code, message = %failure.message, details = ?failure.details, "request failed");
                } else {
                    warn!(code = %failure.code, message = %failure.message, "request rejected");
                }
                if !reported {
                    notify(
                        self.observer.as_ref(),
                        PipelineEvent::QueryFailed {
                            code: failure.code,
                            latency: started.elapsed(),
                        },
                    );
                }
                failure.into_response()
            }
        }
    }

    /// Handles an API-gateway style event. `body` may be a JSON string or an
    /// inline object; `queryStringParameters.max_results` is honoured.
    pub async fn handle_event(&self, event: &Value) -> HttpResponse {
        in_request(event_request_id(event), self.respond_event(event)).await
    }

    async fn respond_event(&self, event: &Value) -> HttpResponse {
        let body = match event.get("body") {
            None | Some(Value::Null) => "{}".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        let max_results = event
            .get("queryStringParameters")
            .and_then(|p| p.get("max_results"))
            .filter(|v| !v.is_null());
        let overrides = match max_results {
            None => QueryOverrides::default(),
            Some(value) => match parse_max_results(value) {
                Ok(max_results) => QueryOverrides { max_results },
                Err(failure) => return self.reject(failure),
            },
        };

        self.respond(&body, overrides).await
    }

    fn reject(&self, failure: Failure) -> HttpResponse {
        warn!(code = %failure.code, message = %failure.message, "request rejected");
        notify(
            self.observer.as_ref(),
            PipelineEvent::QueryFailed {
                code: failure.code,
                latency: Default::default(),
            },
        );
        failure.into_response()
    }

    /// The `bool` in the error says whether the pipeline already reported
    /// the failure to the observer.
    async fn process(
        &self,
        raw_body: &str,
        overrides: QueryOverrides,
    ) -> Result<HttpResponse, (Failure, bool)> {
        let body: Value = serde_json::from_str(raw_body).map_err(|e| {
            (
                Failure::new(
                    ErrorCode::InvalidRequest,
                    "Invalid JSON in request body",
                    e.to_string(),
                ),
                false,
            )
        })?;
        let Value::Object(body) = body else {
            return Err((
                Failure::new(
                    ErrorCode::InvalidRequest,
                    "Request body must be a JSON object",
                    "Send {\"query\": \"...\"}",
                ),
                false,
            ));
        };

        let max_results = match overrides.max_results {
            Some(n) => Some(n),
            None => match body.get("max_results") {
                None => None,
                Some(value) => parse_max_results(value).map_err(|f| (f, false))?,
            },
        };

        let pipeline = match &self.pipeline {
            Ok(pipeline) => pipeline.clone(),
            Err(e) => {
                return Err((
                    Failure::new(ErrorCode::ConfigurationError, e.to_string(), e.details()),
                    false,
                ))
            }
        };

        let query = body
            .get("query")
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));

        let task = tokio::spawn(
            async move { pipeline.answer(&query, max_results).await }.in_current_span(),
        );
        let response = match task.await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err((Failure::from_pipeline(e), true)),
            Err(join_err) => {
                return Err((
                    Failure::internal(format!("query task failed: {}", join_err)),
                    false,
                ))
            }
        };

        let body = serde_json::to_string(&response)
            .map_err(|e| (Failure::internal(e.to_string()), false))?;
        Ok(HttpResponse {
            status_code: 200,
            headers: vec![
                ("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()),
                ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
            ],
            body,
        })
    }
}

/// Runs `handle` inside a `request` span and tags the response with the
/// request ID.
async fn in_request<F>(supplied: Option<&str>, handle: F) -> HttpResponse
where
    F: Future<Output = HttpResponse>,
{
    let request_id = supplied
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let span = info_span!("request", request_id = %request_id);
    let mut response = handle.instrument(span).await;
    response
        .headers
        .push(("X-Request-Id".to_string(), request_id));
    response
}

/// `X-Request-Id` from the event headers (any case), else the gateway's
/// `requestContext.requestId`.
fn event_request_id(event: &Value) -> Option<&str> {
    let from_header = event
        .get("headers")
        .and_then(Value::as_object)
        .and_then(|headers| {
            headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("x-request-id"))
        })
        .and_then(|(_, value)| value.as_str());
    from_header.or_else(|| event.pointer("/requestContext/requestId")?.as_str())
}

/// Reads `max_results` from a raw URL query string; other keys are ignored.
fn parse_query_string(raw: &str) -> Result<QueryOverrides, Failure> {
    let mut values = url::form_urlencoded::parse(raw.as_bytes())
        .filter(|(key, _)| *key == "max_results")
        .map(|(_, value)| value.into_owned());
    let Some(value) = values.next() else {
        return Ok(QueryOverrides::default());
    };
    if values.next().is_some() {
        return Err(Failure::new(
            ErrorCode::InvalidRequest,
            "Invalid max_results",
            "max_results must be given at most once",
        ));
    }
    Ok(QueryOverrides {
        max_results: parse_max_results(&Value::String(value))?,
    })
}

/// `null` means "use the default"; otherwise a non-negative integer is
/// required. Numeric strings are accepted for query-string sources.
fn parse_max_results(value: &Value) -> Result<Option<usize>, Failure> {
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| usize::try_from(n).ok())
        .map(Some)
        .ok_or_else(|| {
            Failure::new(
                ErrorCode::InvalidRequest,
                "Invalid max_results",
                format!("max_results must be a non-negative integer, got {}", value),
            )
        })
}

fn build_pipeline(config: &Config) -> Result<QueryPipeline, ConfigError> {
    let endpoint = config.require_endpoint()?;
    let pipeline_config = config
        .pipeline_config()
        .map_err(|source| ConfigError::Client {
            component: "pipeline",
            source,
        })?;

    let store = OpenSearchStore::new(endpoint, &config.vector_store).map_err(|source| {
        ConfigError::Client {
            component: "vector store client",
            source,
        }
    })?;
    let embedder = create_embedder(&config.embedding).map_err(|source| ConfigError::Client {
        component: "embedding client",
        source,
    })?;
    let generator = create_generator(&config.generation, pipeline_config.generation).map_err(
        |source| ConfigError::Client {
            component: "generation client",
            source,
        },
    )?;

    QueryPipeline::new(pipeline_config, embedder, Arc::new(store), generator).map_err(|source| {
        ConfigError::Client {
            component: "pipeline",
            source,
        }
    })
}
