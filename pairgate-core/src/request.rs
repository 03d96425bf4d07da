//! Validated approval request.
//!
//! An `ApprovalRequest` can only be built through [`ApprovalRequest::new`],
//! so every value that reaches the orchestrator has already passed input
//! validation. Malformed input is rejected before any network call.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{2,32}$").unwrap_or_else(|e| panic!("invalid code pattern: {e}"))
});

/// Malformed caller input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("code must match ^[A-Za-z0-9_-]{{2,32}}$")]
    InvalidCode,
}

/// A pairing approval to relay to one worker.
#[derive(Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    worker_id: String,
    channel: String,
    code: String,
    gateway_token: Option<String>,
}

impl ApprovalRequest {
    /// Validate and build a request.
    ///
    /// # Errors
    ///
    /// - `MissingField` if `worker_id` or `channel` is empty
    /// - `InvalidCode` if `code` does not match `^[A-Za-z0-9_-]{2,32}$`
    pub fn new(
        worker_id: impl Into<String>,
        channel: impl Into<String>,
        code: impl Into<String>,
        gateway_token: Option<String>,
    ) -> Result<Self, ValidationError> {
        let worker_id = worker_id.into();
        let channel = channel.into();
        let code = code.into();

        if worker_id.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "serviceId" });
        }
        if channel.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "channel" });
        }
        if !is_valid_code(&code) {
            return Err(ValidationError::InvalidCode);
        }

        Ok(Self {
            worker_id,
            channel,
            code,
            gateway_token: gateway_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn gateway_token(&self) -> Option<&str> {
        self.gateway_token.as_deref()
    }
}

// The gateway token is a credential.
impl std::fmt::Debug for ApprovalRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalRequest")
            .field("worker_id", &self.worker_id)
            .field("channel", &self.channel)
            .field("code", &self.code)
            .field(
                "gateway_token",
                &self.gateway_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Returns true if `code` is a well-formed pairing code.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    CODE_PATTERN.is_match(code)
}
