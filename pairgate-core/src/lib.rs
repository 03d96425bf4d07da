//! Pairgate Core: pairing approval relay library.
//!
//! Resolves a worker service through a GraphQL directory, drives the
//! worker's WebSocket challenge/connect/approve handshake, falls back to a
//! plain HTTP endpoint, and when all else fails hands back a command an
//! operator can run by hand. The HTTP front end lives in `pairgate-server`.

pub mod config;
pub mod directory;
pub mod error;
pub mod fallback;
pub mod gateway;
pub mod metrics;
pub mod orchestrator;
pub mod request;

pub use config::{ConfigError, RelayConfig, RetryPolicy};
pub use error::{DirectoryError, FallbackError, GatewayError, TransportError};
pub use orchestrator::{ApprovalOrchestrator, ApprovalOutcome, ManualFallback, Method};
pub use request::{ApprovalRequest, ValidationError};
