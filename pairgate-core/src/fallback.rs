//! Secondary approval endpoint on the worker.
//!
//! A single JSON POST used only after every gateway attempt has failed.
//! The reqwest client timeout bounds the whole call, body included. There
//! is no retry: the orchestrator calls this exactly once per run.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::FallbackConfig;
use crate::directory::WorkerName;
use crate::error::FallbackError;

/// Longest worker message carried into an error.
const MAX_MESSAGE_LEN: usize = 512;

/// Submits an approval through the worker's secondary endpoint.
#[async_trait]
pub trait FallbackTransport: Send + Sync {
    /// # Errors
    ///
    /// - `FallbackError::Timeout` if the call exceeds its timeout
    /// - `FallbackError::Rejected` if the worker declines
    /// - `FallbackError::Unreachable` on transport failure or malformed payload
    async fn approve(
        &self,
        worker: &WorkerName,
        channel: &str,
        code: &str,
    ) -> Result<Value, FallbackError>;
}

/// HTTP implementation of [`FallbackTransport`].
#[derive(Clone)]
pub struct HttpFallback {
    client: Client,
    config: FallbackConfig,
    host_template: String,
}

impl HttpFallback {
    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns `FallbackError::Unreachable` if the HTTP client cannot be built.
    pub fn new(
        config: FallbackConfig,
        host_template: impl Into<String>,
    ) -> Result<Self, FallbackError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FallbackError::Unreachable {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            config,
            host_template: host_template.into(),
        })
    }

    /// Endpoint URL for a worker.
    #[must_use]
    pub fn url_for(&self, worker: &WorkerName) -> String {
        format!(
            "http://{}:{}{}",
            worker.host(&self.host_template),
            self.config.port,
            self.config.path
        )
    }

    fn classify(&self, e: reqwest::Error) -> FallbackError {
        if e.is_timeout() {
            FallbackError::Timeout {
                elapsed: self.config.timeout,
            }
        } else {
            FallbackError::Unreachable {
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl FallbackTransport for HttpFallback {
    #[tracing::instrument(skip(self, worker, code), fields(worker = %worker))]
    async fn approve(
        &self,
        worker: &WorkerName,
        channel: &str,
        code: &str,
    ) -> Result<Value, FallbackError> {
        let url = self.url_for(worker);
        debug!(url = %url, "Sending fallback approval");

        let response = self
            .client
            .post(&url)
            .json(&json!({ "channel": channel, "code": code }))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let payload = serde_json::from_slice::<Value>(&body);

        if !status.is_success() {
            let message = match &payload {
                Ok(value) => worker_message(value),
                Err(_) => None,
            }
            .or_else(|| {
                let text = String::from_utf8_lossy(&body).trim().to_string();
                (!text.is_empty()).then_some(text)
            })
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

            warn!(status = %status, "Fallback endpoint rejected approval");
            return Err(FallbackError::Rejected {
                status: status.as_u16(),
                message: truncate(message),
            });
        }

        let payload = payload.map_err(|e| FallbackError::Unreachable {
            reason: format!("malformed response payload: {e}"),
        })?;

        if payload.get("success").and_then(Value::as_bool) == Some(false) {
            let message =
                worker_message(&payload).unwrap_or_else(|| "approval declined".to_string());
            warn!(status = %status, "Fallback payload declared failure");
            return Err(FallbackError::Rejected {
                status: status.as_u16(),
                message: truncate(message),
            });
        }

        Ok(payload)
    }
}

/// First non-empty of `message`, `output`, `error` / `error.message`.
fn worker_message(payload: &Value) -> Option<String> {
    let candidates = [
        payload.get("message"),
        payload.get("output"),
        payload.get("error"),
        payload.get("error").and_then(|e| e.get("message")),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn truncate(mut message: String) -> String {
    if message.len() > MAX_MESSAGE_LEN {
        let mut end = MAX_MESSAGE_LEN;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
        message.push_str("...");
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn worker_name() -> WorkerName {
        WorkerName::from_service_name("worker-telegram-bot").unwrap()
    }

    fn fallback_for(server: &MockServer, timeout: Duration) -> HttpFallback {
        let port = server.address().port();
        HttpFallback::new(
            FallbackConfig::new(port, "/pairing/approve").with_timeout(timeout),
            "127.0.0.1",
        )
        .unwrap()
    }

    async fn respond_with(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pairing/approve"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_url_for_worker() {
        let fallback = HttpFallback::new(
            FallbackConfig::new(8080, "/pairing/approve"),
            "{name}.railway.internal",
        )
        .unwrap();
        assert_eq!(
            fallback.url_for(&worker_name()),
            "http://worker-telegram-bot.railway.internal:8080/pairing/approve"
        );
    }

    #[test]
    fn test_worker_message_precedence() {
        assert_eq!(
            worker_message(&json!({"message": "m", "output": "o"})),
            Some("m".to_string())
        );
        assert_eq!(
            worker_message(&json!({"message": "", "output": "o"})),
            Some("o".to_string())
        );
        assert_eq!(
            worker_message(&json!({"error": {"message": "nested"}})),
            Some("nested".to_string())
        );
        assert_eq!(worker_message(&json!({"success": false})), None);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(MAX_MESSAGE_LEN);
        let out = truncate(long);
        assert!(out.ends_with("..."));
        assert!(out.len() <= MAX_MESSAGE_LEN + 3);
    }

    #[tokio::test]
    async fn test_fallback_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pairing/approve"))
            .and(body_json(json!({"channel": "telegram", "code": "AB12"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "output": "approved"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let payload = fallback_for(&server, Duration::from_secs(2))
            .approve(&worker_name(), "telegram", "AB12")
            .await
            .unwrap();
        assert_eq!(payload["output"], "approved");
    }

    #[tokio::test]
    async fn test_fallback_success_without_flag() {
        let server =
            respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": "ok"}))).await;
        let payload = fallback_for(&server, Duration::from_secs(2))
            .approve(&worker_name(), "telegram", "AB12")
            .await
            .unwrap();
        assert_eq!(payload["output"], "ok");
    }

    #[tokio::test]
    async fn test_fallback_payload_declares_failure() {
        let server = respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "message": "No pending request"})),
        )
        .await;
        let err = fallback_for(&server, Duration::from_secs(2))
            .approve(&worker_name(), "telegram", "AB12")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FallbackError::Rejected {
                status: 200,
                message: "No pending request".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_fallback_http_error_with_text_body() {
        let server =
            respond_with(ResponseTemplate::new(500).set_body_string("pairing store locked")).await;
        let err = fallback_for(&server, Duration::from_secs(2))
            .approve(&worker_name(), "telegram", "AB12")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FallbackError::Rejected {
                status: 500,
                message: "pairing store locked".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_fallback_http_error_without_body() {
        let server = respond_with(ResponseTemplate::new(404)).await;
        let err = fallback_for(&server, Duration::from_secs(2))
            .approve(&worker_name(), "telegram", "AB12")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FallbackError::Rejected {
                status: 404,
                message: "Not Found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_fallback_malformed_success_payload() {
        let server = respond_with(ResponseTemplate::new(200).set_body_string("approved!")).await;
        let err = fallback_for(&server, Duration::from_secs(2))
            .approve(&worker_name(), "telegram", "AB12")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "fallback_unreachable");
    }

    #[tokio::test]
    async fn test_fallback_timeout() {
        let server = respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(json!({"success": true})),
        )
        .await;
        let timeout = Duration::from_millis(200);
        let err = fallback_for(&server, timeout)
            .approve(&worker_name(), "telegram", "AB12")
            .await
            .unwrap_err();
        assert_eq!(err, FallbackError::Timeout { elapsed: timeout });
    }

    #[tokio::test]
    async fn test_fallback_connection_refused() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let fallback = HttpFallback::new(
            FallbackConfig::new(port, "/pairing/approve").with_timeout(Duration::from_secs(2)),
            "127.0.0.1",
        )
        .unwrap();
        let err = fallback
            .approve(&worker_name(), "telegram", "AB12")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "fallback_unreachable");
    }
}
