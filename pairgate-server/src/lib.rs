//! Pairgate HTTP server.
//!
//! Authenticates callers, validates approval requests, and hands them to
//! the [`pairgate_core::ApprovalOrchestrator`].

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging_layer;
