//! Directory lookup: opaque worker identifier → routable worker name.
//!
//! The directory is a GraphQL endpoint queried once per run with a bearer
//! token. The resolver never retries; the orchestrator decides what a
//! failure means.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use tracing::{debug, warn};

use crate::config::{DirectoryConfig, HOST_PLACEHOLDER};
use crate::error::DirectoryError;

const SERVICE_QUERY: &str = "query service($id: String!) { service(id: $id) { id name } }";

/// Network-routable name of a worker.
///
/// Normalized to the private-DNS form: lowercase ASCII alphanumerics and
/// single hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerName(String);

impl WorkerName {
    /// Normalize a raw service name. Returns `None` if nothing routable remains.
    #[must_use]
    pub fn from_service_name(raw: &str) -> Option<Self> {
        let mut out = String::with_capacity(raw.len());
        for ch in raw.trim().chars() {
            let ch = ch.to_ascii_lowercase();
            if ch.is_ascii_alphanumeric() {
                out.push(ch);
            } else if !out.ends_with('-') {
                out.push('-');
            }
        }
        let trimmed = out.trim_matches('-');
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the connectable host for this worker from a template.
    ///
    /// A template without the `{name}` placeholder is used verbatim, which
    /// pins every worker to one host.
    #[must_use]
    pub fn host(&self, template: &str) -> String {
        template.replace(HOST_PLACEHOLDER, &self.0)
    }
}

impl fmt::Display for WorkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves worker identifiers.
#[async_trait]
pub trait DirectoryResolver: Send + Sync {
    /// Resolve `worker_id` to a routable name.
    ///
    /// # Errors
    ///
    /// - `DirectoryError::NotFound` if the directory has no such record
    /// - `DirectoryError::Upstream` on transport or directory errors
    async fn resolve(&self, worker_id: &str) -> Result<WorkerName, DirectoryError>;
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ServiceData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct ServiceData {
    service: Option<ServiceRecord>,
}

#[derive(Debug, Deserialize)]
struct ServiceRecord {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// GraphQL directory client.
#[derive(Clone)]
pub struct GraphQlDirectory {
    client: Client,
    config: DirectoryConfig,
}

impl GraphQlDirectory {
    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Upstream` if the HTTP client cannot be built.
    pub fn new(config: DirectoryConfig) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DirectoryError::Upstream {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl DirectoryResolver for GraphQlDirectory {
    #[tracing::instrument(skip(self), fields(url = %self.config.url))]
    async fn resolve(&self, worker_id: &str) -> Result<WorkerName, DirectoryError> {
        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(self.config.token())
            .json(&json!({
                "query": SERVICE_QUERY,
                "variables": { "id": worker_id },
            }))
            .send()
            .await
            .map_err(|e| DirectoryError::Upstream {
                reason: if e.is_timeout() {
                    format!("request timed out after {:?}", self.config.timeout)
                } else {
                    format!("request failed: {e}")
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Directory returned non-success status");
            return Err(DirectoryError::Upstream {
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let body: GraphQlResponse = response.json().await.map_err(|e| DirectoryError::Upstream {
            reason: format!("invalid response body: {e}"),
        })?;

        if !body.errors.is_empty() {
            let messages: Vec<&str> = body.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(DirectoryError::Upstream {
                reason: messages.join("; "),
            });
        }

        let record = body
            .data
            .and_then(|d| d.service)
            .ok_or_else(|| DirectoryError::NotFound {
                worker_id: worker_id.to_string(),
            })?;

        let name =
            WorkerName::from_service_name(&record.name).ok_or_else(|| DirectoryError::Upstream {
                reason: format!("service '{}' has no routable name", record.id),
            })?;

        debug!(service_id = %record.id, worker = %name, "Resolved worker");
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn directory_for(server: &MockServer) -> GraphQlDirectory {
        let config = DirectoryConfig::new(format!("{}/graphql/v2", server.uri()), "dir-token")
            .with_timeout(Duration::from_millis(500));
        GraphQlDirectory::new(config).unwrap()
    }

    #[test]
    fn test_worker_name_normalization() {
        assert_eq!(
            WorkerName::from_service_name("worker-telegram-bot")
                .unwrap()
                .as_str(),
            "worker-telegram-bot"
        );
        assert_eq!(
            WorkerName::from_service_name("  Worker Telegram__Bot ")
                .unwrap()
                .as_str(),
            "worker-telegram-bot"
        );
        assert!(WorkerName::from_service_name(" -- ").is_none());
    }

    #[test]
    fn test_worker_host_template() {
        let name = WorkerName::from_service_name("worker-telegram-bot").unwrap();
        assert_eq!(
            name.host("{name}.railway.internal"),
            "worker-telegram-bot.railway.internal"
        );
        assert_eq!(name.host("127.0.0.1"), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_resolve_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql/v2"))
            .and(header("authorization", "Bearer dir-token"))
            .and(body_partial_json(json!({ "variables": { "id": "svc1" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "service": { "id": "svc1", "name": "worker-telegram-bot" } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let name = directory_for(&server).resolve("svc1").await.unwrap();
        assert_eq!(name.as_str(), "worker-telegram-bot");
    }

    #[tokio::test]
    async fn test_resolve_missing_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "service": null } })),
            )
            .mount(&server)
            .await;

        let err = directory_for(&server).resolve("ghost").await.unwrap_err();
        assert_eq!(
            err,
            DirectoryError::NotFound {
                worker_id: "ghost".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_graphql_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "errors": [{ "message": "Not Authorized" }]
            })))
            .mount(&server)
            .await;

        let err = directory_for(&server).resolve("svc1").await.unwrap_err();
        assert_eq!(
            err,
            DirectoryError::Upstream {
                reason: "Not Authorized".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = directory_for(&server).resolve("svc1").await.unwrap_err();
        assert_eq!(
            err,
            DirectoryError::Upstream {
                reason: "HTTP 502".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = directory_for(&server).resolve("svc1").await.unwrap_err();
        assert_eq!(err.kind(), "directory_upstream");
    }

    #[tokio::test]
    async fn test_resolve_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(json!({ "data": { "service": null } })),
            )
            .mount(&server)
            .await;

        let err = directory_for(&server).resolve("svc1").await.unwrap_err();
        assert_eq!(err.kind(), "directory_upstream");
    }
}
