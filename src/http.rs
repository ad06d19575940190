//! Shared HTTP plumbing for the capability clients.
//!
//! Every outbound call (embeddings, chat completions, vector search) goes
//! through [`send_json`], which applies the same retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: base × 1, 2, 4, 8, 16, 32 (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt.saturating_sub(1)).min(5))
    }
}

pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Sends the request produced by `build`, retrying transient failures, and
/// returns the JSON body of the first successful response.
///
/// `service` names the remote side in error messages (e.g. `"OpenAI API"`).
pub async fn send_json<F>(service: &str, retry: RetryPolicy, build: F) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=retry.max_retries {
        if attempt > 0 {
            tokio::time::sleep(retry.delay(attempt)).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(service, %status, attempt, "transient error, will retry");
                    last_err = Some(anyhow::anyhow!("{} error {}: {}", service, status, body_text));
                    continue;
                }

                bail!("{} error {}: {}", service, status, body_text);
            }
            Err(e) => {
                warn!(service, error = %e, attempt, "request failed, will retry");
                last_err = Some(anyhow::anyhow!("{} connection error: {}", service, e));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", service)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::new(10);
        let delays: Vec<u64> = (1..=8).map(|a| policy.delay(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 32, 32]);
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/flaky", server.uri());
        let json = send_json("test", fast(3), || client.post(&url)).await.unwrap();
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/bad", server.uri());
        let err = send_json("test", fast(3), || client.post(&url))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("bad input"));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/limited", server.uri());
        let err = send_json("test", fast(2), || client.post(&url))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
