//! Error types for the pairgate HTTP layer.
//!
//! Every rejection leaves the server as a JSON body of the form
//! `{"success": false, "error": "..."}`. Orchestration failures are not
//! errors here: a manual fallback is a normal outcome and is rendered by
//! the approve handler itself.
//!
//! [`StartupError`] covers the binary's own startup and serve failures.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pairgate_core::{ConfigError, ValidationError};
use serde_json::json;
use thiserror::Error;

/// Errors rejected before any orchestration work starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Missing or wrong bearer token (401)
    #[error("unauthorized")]
    Unauthorized,

    /// Body is not valid JSON or has the wrong shape (400)
    #[error("invalid request body: {0}")]
    MalformedBody(String),

    /// Body parsed but failed field validation (400)
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::MalformedBody(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

/// Failures that stop the server from starting or keep it from serving.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("invalid relay configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}
