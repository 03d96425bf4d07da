//! Approval orchestration: resolve → gateway ×K → fallback ×1 → outcome.
//!
//! Every stage error is caught here and recorded in an [`AttemptLog`]. A run
//! never fails: when every path is exhausted it returns
//! [`ApprovalOutcome::ManualFallback`] with a runnable command for an
//! operator.
//!
//! ```text
//! resolve ──err──────────────────────────────────────────────┐
//!    │ ok                                                     ▼
//! gateway #1 ──err──▶ backoff ──▶ gateway #2 ──err──▶ fallback ──err──▶ ManualFallback
//!    │ ok                            │ ok                 │ ok
//!    ▼                               ▼                    ▼
//! Success(gateway)             Success(gateway)     Success(fallback)
//! ```
//!
//! Stages run strictly in sequence. The only suspension points are the
//! transport calls and the backoff sleep.

use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{ConfigError, RelayConfig, RetryPolicy};
use crate::directory::{DirectoryResolver, GraphQlDirectory};
use crate::error::TransportError;
use crate::fallback::{FallbackTransport, HttpFallback};
use crate::gateway::{GatewayTransport, WsGateway};
use crate::metrics::RelayMetrics;
use crate::request::ApprovalRequest;

/// Remediation steps returned with every manual fallback.
pub const MANUAL_INSTRUCTIONS: [&str; 4] = [
    "Open a shell on the worker service from your hosting dashboard or CLI",
    "Run the command shown in the 'command' field inside that shell",
    "Confirm the output reports the pairing request as approved",
    "Send a new message to the bot from the paired account to verify access",
];

/// Which transport delivered the approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Gateway,
    Fallback,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Fallback => "fallback",
        }
    }
}

/// Pipeline stage an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Directory,
    Gateway,
    Fallback,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::Gateway => "gateway",
            Self::Fallback => "fallback",
        }
    }
}

/// One failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub stage: Stage,
    pub error: TransportError,
}

/// Ordered record of failed attempts within one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptLog {
    entries: Vec<AttemptRecord>,
}

impl AttemptLog {
    fn record(&mut self, stage: Stage, error: impl Into<TransportError>) {
        self.entries.push(AttemptRecord {
            stage,
            error: error.into(),
        });
    }

    #[must_use]
    pub fn entries(&self) -> &[AttemptRecord] {
        &self.entries
    }

    #[must_use]
    pub fn last(&self) -> Option<&AttemptRecord> {
        self.entries.last()
    }

    /// Number of attempts recorded for `stage`.
    #[must_use]
    pub fn count(&self, stage: Stage) -> usize {
        self.entries.iter().filter(|e| e.stage == stage).count()
    }
}

/// Operator instructions produced when every path failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualFallback {
    pub command: String,
    pub instructions: Vec<String>,
    pub last_error: String,
    pub attempts: AttemptLog,
}

/// Result of one orchestration run.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
    Success { method: Method, payload: Value },
    ManualFallback(ManualFallback),
}

impl ApprovalOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Coordinates the resolver and both transports for one request at a time.
///
/// Holds only shared, read-only collaborators, so one instance serves any
/// number of concurrent runs.
#[derive(Clone)]
pub struct ApprovalOrchestrator {
    directory: Arc<dyn DirectoryResolver>,
    gateway: Arc<dyn GatewayTransport>,
    fallback: Arc<dyn FallbackTransport>,
    policy: RetryPolicy,
    metrics: Option<Arc<RelayMetrics>>,
}

impl ApprovalOrchestrator {
    #[must_use]
    pub fn new(
        directory: Arc<dyn DirectoryResolver>,
        gateway: Arc<dyn GatewayTransport>,
        fallback: Arc<dyn FallbackTransport>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            directory,
            gateway,
            fallback,
            policy,
            metrics: None,
        }
    }

    /// Build the production collaborators from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Client` if an HTTP client cannot be built.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        let directory =
            GraphQlDirectory::new(config.directory.clone()).map_err(|e| ConfigError::Client {
                client: "directory",
                reason: e.to_string(),
            })?;
        let gateway = WsGateway::new(config.gateway.clone(), &config.worker_host_template);
        let fallback = HttpFallback::new(config.fallback.clone(), &config.worker_host_template)
            .map_err(|e| ConfigError::Client {
                client: "fallback",
                reason: e.to_string(),
            })?;

        Ok(Self::new(
            Arc::new(directory),
            Arc::new(gateway),
            Arc::new(fallback),
            config.retry.clone(),
        ))
    }

    /// Record attempts and outcomes into `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<RelayMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the full pipeline for one request.
    #[tracing::instrument(
        skip(self, request),
        fields(worker_id = %request.worker_id(), channel = %request.channel())
    )]
    pub async fn run(&self, request: &ApprovalRequest) -> ApprovalOutcome {
        let started = Instant::now();
        let mut log = AttemptLog::default();

        let worker = match self.directory.resolve(request.worker_id()).await {
            Ok(worker) => {
                self.attempt_ok(Stage::Directory);
                worker
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Worker resolution failed, skipping transports");
                self.attempt_failed(Stage::Directory, e.kind());
                log.record(Stage::Directory, e);
                return self.finish(self.manual(request, log), started);
            }
        };

        let attempts = self.policy.gateway_attempts.max(1);
        for attempt in 1..=attempts {
            if attempt > 1 {
                info!(
                    attempt,
                    backoff_ms = self.policy.backoff.as_millis() as u64,
                    "Backing off before next gateway attempt"
                );
                tokio::time::sleep(self.policy.backoff).await;
            }

            match self
                .gateway
                .approve(
                    &worker,
                    request.channel(),
                    request.code(),
                    request.gateway_token(),
                )
                .await
            {
                Ok(payload) => {
                    self.attempt_ok(Stage::Gateway);
                    info!(worker = %worker, attempt, "Pairing approved via gateway");
                    let outcome = ApprovalOutcome::Success {
                        method: Method::Gateway,
                        payload,
                    };
                    return self.finish(outcome, started);
                }
                Err(e) => {
                    warn!(
                        worker = %worker,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        kind = e.kind(),
                        "Gateway attempt failed"
                    );
                    self.attempt_failed(Stage::Gateway, e.kind());
                    log.record(Stage::Gateway, e);
                }
            }
        }

        match self
            .fallback
            .approve(&worker, request.channel(), request.code())
            .await
        {
            Ok(payload) => {
                self.attempt_ok(Stage::Fallback);
                info!(worker = %worker, "Pairing approved via fallback");
                self.finish(
                    ApprovalOutcome::Success {
                        method: Method::Fallback,
                        payload,
                    },
                    started,
                )
            }
            Err(e) => {
                warn!(worker = %worker, error = %e, kind = e.kind(), "Fallback attempt failed");
                self.attempt_failed(Stage::Fallback, e.kind());
                log.record(Stage::Fallback, e);
                self.finish(self.manual(request, log), started)
            }
        }
    }

    fn manual(&self, request: &ApprovalRequest, attempts: AttemptLog) -> ApprovalOutcome {
        let last_error = attempts
            .last()
            .map(|a| a.error.to_string())
            .unwrap_or_else(|| "unknown error".to_string());

        ApprovalOutcome::ManualFallback(ManualFallback {
            command: manual_command(&self.policy.control_tool, request.channel(), request.code()),
            instructions: MANUAL_INSTRUCTIONS.iter().map(|s| s.to_string()).collect(),
            last_error,
            attempts,
        })
    }

    fn finish(&self, outcome: ApprovalOutcome, started: Instant) -> ApprovalOutcome {
        let elapsed = started.elapsed();
        match &outcome {
            ApprovalOutcome::Success { method, .. } => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_outcome(method.as_str(), "success", elapsed.as_secs_f64());
                }
            }
            ApprovalOutcome::ManualFallback(manual) => {
                warn!(
                    attempts = manual.attempts.entries().len(),
                    last_error = %manual.last_error,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "All approval paths exhausted, returning manual instructions"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_outcome("manual", "manual_fallback", elapsed.as_secs_f64());
                }
            }
        }
        outcome
    }

    fn attempt_ok(&self, stage: Stage) {
        if let Some(metrics) = &self.metrics {
            metrics.record_attempt(stage.as_str(), "ok");
        }
    }

    fn attempt_failed(&self, stage: Stage, kind: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_attempt(stage.as_str(), kind);
        }
    }
}

/// `<tool> pairing approve <channel> <code>`, quoting words the shell would split.
#[must_use]
pub fn manual_command(tool: &str, channel: &str, code: &str) -> String {
    format!(
        "{} pairing approve {} {}",
        tool,
        shell_word(channel),
        shell_word(code)
    )
}

fn shell_word(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '/'));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
