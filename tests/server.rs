//! HTTP server tests over a real socket.
//!
//! The fully wired test builds the service from a [`Config`] whose vector
//! store, embedder and model all point at a wiremock server, so the
//! production clients are exercised end to end.

use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docsage::config::{load_config_with_env, Config, ConfigError};
use docsage::handler::QueryService;
use docsage::server::router;

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn start(service: QueryService) -> u16 {
    let port = find_free_port();
    let app = router(Arc::new(service));
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    wait_for_server(port).await;
    port
}

/// Config pointing every remote capability at `mock`.
fn wired_config(mock: &MockServer) -> Config {
    let mut config = load_config_with_env(None, |name| match name {
        "VECTOR_STORE_ENDPOINT" => Some(mock.uri()),
        "INDEX_NAME" => Some("widgets-docs".to_string()),
        "RETRIEVAL_K" => Some("3".to_string()),
        _ => None,
    })
    .unwrap();
    config.embedding.provider = "ollama".to_string();
    config.embedding.model = "nomic-embed-text".to_string();
    config.embedding.dims = 3;
    config.embedding.url = Some(mock.uri());
    config.embedding.max_retries = 0;
    config.generation.provider = "ollama".to_string();
    config.generation.model = "llama3.1".to_string();
    config.generation.url = Some(mock.uri());
    config.generation.max_retries = 0;
    config.vector_store.max_retries = 0;
    config.metrics.enabled = false;
    config
}

async fn mount_backends(mock: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "nomic-embed-text"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2, 0.3]],
        })))
        .mount(mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/widgets-docs/_search"))
        .and(body_partial_json(json!({"size": 3})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": {"hits": [
                {"_score": 0.92, "_source": {
                    "text": "Failed calls retry with exponential backoff.",
                    "metadata": {"repo_url": "https://github.com/acme/widgets", "file_path": "docs/retry.md"}
                }},
                {"_score": 0.81, "_source": {
                    "text": "Retries stop after five attempts.",
                    "metadata": {"repo_url": "https://github.com/acme/widgets", "file_path": "docs/limits.md"}
                }},
                {"_score": 0.40, "_source": {
                    "text": "Install with cargo.",
                    "metadata": {"repo_url": "https://github.com/acme/widgets", "file_path": "README.md"}
                }}
            ]}
        })))
        .mount(mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "llama3.1", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "Calls retry with exponential backoff, up to five attempts."},
            "done": true,
        })))
        .mount(mock)
        .await;
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let port = start(QueryService::unconfigured(ConfigError::MissingEndpoint)).await;
    let resp = reqwest::get(format!("http://127.0.0.1:{}/health", port))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["configured"], false);
}

#[tokio::test]
async fn test_unconfigured_server_reports_configuration_error() {
    let port = start(QueryService::unconfigured(ConfigError::MissingEndpoint)).await;
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/query", port))
        .body(r#"{"query": "What is the retry policy?"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/json"
    );
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");
}

#[tokio::test]
async fn test_fully_wired_query() {
    let mock = MockServer::start().await;
    mount_backends(&mock).await;

    let service = QueryService::from_config(&wired_config(&mock));
    assert!(service.is_configured());
    let port = start(service).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://127.0.0.1:{}/query", port))
        .json(&json!({"query": "What is the retry policy?", "max_results": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["answer"],
        "Calls retry with exponential backoff, up to five attempts."
    );
    assert_eq!(body["query"], "What is the retry policy?");
    let sources = body["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0]["file_path"], "docs/retry.md");
    assert_eq!(sources[0]["relevance_score"], 0.92);
    assert_eq!(sources[1]["file_path"], "docs/limits.md");

    // The model saw every retrieved chunk, not only the cited ones.
    let requests = mock.received_requests().await.unwrap();
    let chat = requests
        .iter()
        .find(|r| r.url.path() == "/api/chat")
        .unwrap();
    let chat_body: Value = serde_json::from_slice(&chat.body).unwrap();
    let prompt = chat_body["messages"][0]["content"].as_str().unwrap();
    assert!(prompt.contains("Document 3 (from https://github.com/acme/widgets/README.md):"));
    assert!(prompt.contains("What is the retry policy?"));
}

#[tokio::test]
async fn test_query_string_max_results() {
    let mock = MockServer::start().await;
    mount_backends(&mock).await;
    let port = start(QueryService::from_config(&wired_config(&mock))).await;

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/query?max_results=1", port))
        .body(r#"{"query": "retry?", "max_results": 3}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["sources"].as_array().unwrap().len(), 1);

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/query?max_results=several", port))
        .body(r#"{"query": "retry?"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_backend_failure_is_processing_error() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2, 0.3]],
        })))
        .mount(&mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/widgets-docs/_search"))
        .respond_with(ResponseTemplate::new(403).set_body_string("index_closed_exception"))
        .mount(&mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;

    let port = start(QueryService::from_config(&wired_config(&mock))).await;
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/query", port))
        .body(r#"{"query": "retry?"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "PROCESSING_ERROR");
    let details = body["error"]["details"].as_str().unwrap();
    assert!(details.contains("similarity search failed"));
    assert!(details.contains("index_closed_exception"));
}

#[tokio::test]
async fn test_malformed_json_over_http() {
    let port = start(QueryService::unconfigured(ConfigError::MissingEndpoint)).await;
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/query", port))
        .body("{\"query\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
    assert_eq!(body["error"]["message"], "Invalid JSON in request body");
}

#[tokio::test]
async fn test_undecodable_body_gets_error_contract() {
    let port = start(QueryService::unconfigured(ConfigError::MissingEndpoint)).await;
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/query", port))
        .body(vec![0xff, 0xfe, b'{'])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/json"
    );
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
    assert_eq!(body["error"]["message"], "Invalid JSON in request body");
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_repeated_max_results_gets_error_contract() {
    let port = start(QueryService::unconfigured(ConfigError::MissingEndpoint)).await;
    let resp = reqwest::Client::new()
        .post(format!(
            "http://127.0.0.1:{}/query?max_results=1&max_results=2",
            port
        ))
        .body(r#"{"query": "retry?"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/json"
    );
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
    assert_eq!(body["error"]["message"], "Invalid max_results");
}

#[tokio::test]
async fn test_request_id_round_trip() {
    let port = start(QueryService::unconfigured(ConfigError::MissingEndpoint)).await;
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/query", port);

    let resp = client
        .post(&url)
        .header("X-Request-Id", "docs-portal-7")
        .body(r#"{"query": "retry?"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers().get("x-request-id").unwrap(), "docs-portal-7");

    let resp = client
        .post(&url)
        .body(r#"{"query": "retry?"}"#)
        .send()
        .await
        .unwrap();
    let generated = resp.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());
}
