//! Test helpers for pairgate integration tests.
//!
//! - Mock worker gateway (WebSocket)
//! - In-process relay harness wired to wiremock directory and fallback

#![allow(dead_code)]

pub mod mock_gateway;

pub use mock_gateway::*;

use pairgate_core::config::{DirectoryConfig, FallbackConfig, GatewayConfig};
use pairgate_core::metrics::RelayMetrics;
use pairgate_core::{ApprovalOrchestrator, RelayConfig, RetryPolicy};
use pairgate_server::api::{AppState, router};
use pairgate_server::auth::ApiKey;
use prometheus_client::registry::Registry;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_KEY: &str = "relay-key";
pub const DIRECTORY_TOKEN: &str = "dir-token";

/// Directory mock answering every lookup with `name`. Expects `expected` calls.
pub async fn mock_directory(name: &str, expected: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", format!("Bearer {DIRECTORY_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "service": { "id": "svc1", "name": name } }
        })))
        .expect(expected)
        .mount(&server)
        .await;
    server
}

/// Fallback mock returning `template`. Expects `expected` calls.
pub async fn mock_fallback(template: ResponseTemplate, expected: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pairing/approve"))
        .respond_with(template)
        .expect(expected)
        .mount(&server)
        .await;
    server
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Relay configuration pointing every collaborator at localhost.
pub fn relay_config(
    directory: &MockServer,
    gateway_port: u16,
    fallback: &MockServer,
    watchdog: Duration,
) -> RelayConfig {
    RelayConfig {
        directory: DirectoryConfig::new(format!("{}/graphql", directory.uri()), DIRECTORY_TOKEN)
            .with_timeout(Duration::from_secs(5)),
        worker_host_template: "127.0.0.1".to_string(),
        gateway: GatewayConfig::new(gateway_port).with_timeout(watchdog),
        fallback: FallbackConfig::new(fallback.address().port(), "/pairing/approve")
            .with_timeout(Duration::from_secs(5)),
        retry: RetryPolicy {
            gateway_attempts: 2,
            backoff: Duration::from_millis(100),
            control_tool: "openclaw".to_string(),
        },
    }
}

/// The relay served over real TCP.
pub struct RelayHarness {
    pub base_url: String,
    pub client: reqwest::Client,
    handle: JoinHandle<()>,
}

impl RelayHarness {
    pub async fn start(config: RelayConfig) -> Self {
        config.validate().unwrap();

        let mut registry = Registry::default();
        let metrics = Arc::new(RelayMetrics::new(&mut registry));
        let orchestrator = ApprovalOrchestrator::from_config(&config)
            .unwrap()
            .with_metrics(metrics);
        let state = AppState::new(
            Arc::new(orchestrator),
            ApiKey::new(API_KEY),
            "pairgate",
            Arc::new(registry),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router(state)).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            handle,
        }
    }

    /// POST /pairing/approve with the correct API key.
    pub async fn approve(&self, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}/pairing/approve", self.base_url))
            .bearer_auth(API_KEY)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        let json = response.json::<Value>().await.unwrap();
        (status, json)
    }

    pub async fn get_text(&self, route: &str) -> (u16, String) {
        let response = self
            .client
            .get(format!("{}{route}", self.base_url))
            .send()
            .await
            .unwrap();
        (response.status().as_u16(), response.text().await.unwrap())
    }
}

impl Drop for RelayHarness {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
