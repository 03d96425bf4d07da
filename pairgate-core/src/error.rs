//! Error types for the approval pipeline.
//!
//! Each transport has its own error enum so the orchestrator can record
//! exactly which stage failed and how. None of these errors escape a run:
//! the orchestrator folds them into the attempt log and, on exhaustion,
//! into a manual-remediation outcome.
//!
//! # Error Classification
//!
//! | Stage | Variants |
//! |-------|----------|
//! | Directory | `NotFound`, `Upstream` |
//! | Gateway | `Timeout`, `Rejected`, `Unreachable` |
//! | Fallback | `Timeout`, `Rejected`, `Unreachable` |

use std::time::Duration;
use thiserror::Error;

/// Errors from resolving a worker identifier to a routable name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The directory answered but holds no record for the identifier.
    #[error("worker '{worker_id}' not found in directory")]
    NotFound {
        /// The identifier that was looked up
        worker_id: String,
    },

    /// Transport failure, unparseable body, or directory-reported errors.
    #[error("directory lookup failed: {reason}")]
    Upstream {
        /// Human-readable reason
        reason: String,
    },
}

/// Errors from one gateway handshake attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The session watchdog elapsed before a terminal frame arrived.
    #[error("gateway session timed out after {}ms", elapsed.as_millis())]
    Timeout {
        /// Watchdog duration that elapsed
        elapsed: Duration,
    },

    /// The worker answered with an error response.
    #[error("gateway rejected {stage}: {message}")]
    Rejected {
        /// Which request was rejected ("connect" or "approve")
        stage: &'static str,
        /// Worker-supplied error message
        message: String,
    },

    /// Connection refused, reset, or closed before completion.
    #[error("gateway unreachable: {reason}")]
    Unreachable {
        /// Human-readable reason
        reason: String,
    },
}

/// Errors from the single fallback HTTP call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FallbackError {
    /// The whole call exceeded its timeout.
    #[error("fallback request timed out after {}ms", elapsed.as_millis())]
    Timeout {
        /// Timeout that elapsed
        elapsed: Duration,
    },

    /// The worker answered but declined the approval.
    #[error("fallback rejected (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status code returned by the worker
        status: u16,
        /// Worker-supplied message
        message: String,
    },

    /// Connection failure or malformed response payload.
    #[error("fallback unreachable: {reason}")]
    Unreachable {
        /// Human-readable reason
        reason: String,
    },
}

/// Any error recorded in an attempt log.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Fallback(#[from] FallbackError),
}

impl DirectoryError {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "directory_not_found",
            Self::Upstream { .. } => "directory_upstream",
        }
    }
}

impl GatewayError {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "gateway_timeout",
            Self::Rejected { .. } => "gateway_rejected",
            Self::Unreachable { .. } => "gateway_unreachable",
        }
    }
}

impl FallbackError {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "fallback_timeout",
            Self::Rejected { .. } => "fallback_rejected",
            Self::Unreachable { .. } => "fallback_unreachable",
        }
    }
}

impl TransportError {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Directory(e) => e.kind(),
            Self::Gateway(e) => e.kind(),
            Self::Fallback(e) => e.kind(),
        }
    }
}
