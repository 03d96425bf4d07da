//! HTTP routes.
//!
//! - `GET /health` - liveness, no auth
//! - `POST /pairing/approve` - bearer-authenticated approval relay
//! - `GET /metrics` - OpenMetrics text, no auth

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pairgate_core::{ApprovalOrchestrator, ApprovalOutcome, ApprovalRequest, ValidationError};
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info};

use crate::auth::ApiKey;
use crate::error::ApiError;
use crate::logging_layer::logging_layer;

/// Shared, read-only state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ApprovalOrchestrator>,
    pub api_key: ApiKey,
    pub service_name: Arc<str>,
    pub registry: Arc<Registry>,
}

impl AppState {
    #[must_use]
    pub fn new(
        orchestrator: Arc<ApprovalOrchestrator>,
        api_key: ApiKey,
        service_name: impl Into<Arc<str>>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            orchestrator,
            api_key,
            service_name: service_name.into(),
            registry,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/pairing/approve", post(approve_handler))
        .route("/metrics", get(metrics_handler))
        .layer(logging_layer())
        .with_state(state)
}

/// Inbound approve body. Every field is optional here so that absent
/// fields surface as validation errors rather than extractor rejections.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApproveBody {
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub gateway_token: Option<String>,
}

impl ApproveBody {
    fn into_request(self) -> Result<ApprovalRequest, ValidationError> {
        let code = self
            .code
            .ok_or(ValidationError::MissingField { field: "code" })?;
        ApprovalRequest::new(
            self.service_id.unwrap_or_default(),
            self.channel.unwrap_or_default(),
            code,
            self.gateway_token,
        )
    }
}

#[derive(Serialize)]
struct ApprovedResponse {
    success: bool,
    method: &'static str,
    message: String,
    result: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManualResponse {
    success: bool,
    error: String,
    requires_manual: bool,
    command: String,
    instructions: Vec<String>,
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": &*state.service_name,
    }))
}

async fn approve_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ApproveBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    state.api_key.authorize(&headers)?;
    let Json(body) = body.map_err(|e| ApiError::MalformedBody(e.body_text()))?;
    let request = body.into_request()?;

    info!(worker_id = %request.worker_id(), channel = %request.channel(), "Approval requested");

    let response = match state.orchestrator.run(&request).await {
        ApprovalOutcome::Success { method, payload } => (
            StatusCode::OK,
            Json(ApprovedResponse {
                success: true,
                method: method.as_str(),
                message: format!("Pairing approved via {}", method.as_str()),
                result: payload,
            }),
        )
            .into_response(),
        ApprovalOutcome::ManualFallback(manual) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ManualResponse {
                success: false,
                error: manual.last_error,
                requires_manual: true,
                command: manual.command,
                instructions: manual.instructions,
            }),
        )
            .into_response(),
    };
    Ok(response)
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut buffer = String::new();

    if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &state.registry) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {e}"),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buffer,
    )
        .into_response()
}
