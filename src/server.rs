//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Answer a question (`{"query": "...", "max_results": 3}`) |
//! | `GET`  | `/health` | Health check (returns version and configuration state) |
//!
//! `POST /query` also accepts `?max_results=N`, which takes precedence over
//! the body field. Responses follow the contract in [`crate::handler`]: the
//! body, query string and headers are taken raw so that every failure,
//! including undecodable input, gets the JSON error body.
//!
//! An incoming `X-Request-Id` header is used as the request ID.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based
//! documentation portals can call the API directly.

use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, RawQuery, State},
    http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::handler::{HttpResponse, QueryService};

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(QueryService::from_config(config));
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(addr = %config.server.bind, "docsage listening");
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(service: Arc<QueryService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/query", post(handle_query))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(service)
}

/// Handler for `POST /query`.
async fn handle_query(
    State(service): State<Arc<QueryService>>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let request_id = headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok());

    let response = match body {
        Ok(body) => {
            service
                .handle_http(&body, raw_query.as_deref(), request_id)
                .await
        }
        Err(rejection) => {
            service
                .handle_unreadable_body(&rejection.body_text(), request_id)
                .await
        }
    };
    into_axum(response)
}

fn into_axum(response: HttpResponse) -> Response {
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    for (name, value) in response.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            out.headers_mut().insert(name, value);
        }
    }
    out
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    configured: bool,
}

async fn handle_health(State(service): State<Arc<QueryService>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        configured: service.is_configured(),
    })
}
