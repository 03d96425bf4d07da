//! WebSocket driver for the handshake state machine.
//!
//! One [`GatewaySession`] owns one connection for the duration of one
//! approval attempt. The session-wide watchdog is a single deadline that
//! bounds connect, every frame wait, and every send.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::frame::InboundFrame;
use super::machine::{Action, Event, SessionState};
use crate::config::{GatewayConfig, MAX_TIMEOUT};
use crate::directory::WorkerName;
use crate::error::GatewayError;

/// Upper bound on sending the close frame after a terminal state.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Submits an approval through a worker's control endpoint.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    /// Run one complete handshake attempt.
    ///
    /// # Errors
    ///
    /// Returns the session's terminal `GatewayError`.
    async fn approve(
        &self,
        worker: &WorkerName,
        channel: &str,
        code: &str,
        auth_token: Option<&str>,
    ) -> Result<Value, GatewayError>;
}

/// WebSocket gateway transport. Each call opens a fresh session.
#[derive(Debug, Clone)]
pub struct WsGateway {
    config: GatewayConfig,
    host_template: String,
}

impl WsGateway {
    #[must_use]
    pub fn new(config: GatewayConfig, host_template: impl Into<String>) -> Self {
        Self {
            config,
            host_template: host_template.into(),
        }
    }

    /// Control endpoint URL for a worker.
    #[must_use]
    pub fn url_for(&self, worker: &WorkerName) -> String {
        format!(
            "ws://{}:{}",
            worker.host(&self.host_template),
            self.config.port
        )
    }
}

#[async_trait]
impl GatewayTransport for WsGateway {
    #[tracing::instrument(skip(self, worker, code, auth_token), fields(worker = %worker))]
    async fn approve(
        &self,
        worker: &WorkerName,
        channel: &str,
        code: &str,
        auth_token: Option<&str>,
    ) -> Result<Value, GatewayError> {
        let token = self.config.effective_token(auth_token).map(str::to_string);
        let state = SessionState::new(channel, code, token, self.config.timeout);
        GatewaySession::new(self.url_for(worker), self.config.timeout)
            .run(state)
            .await
    }
}

/// A single handshake over one connection.
pub struct GatewaySession {
    url: String,
    watchdog: Duration,
}

impl GatewaySession {
    #[must_use]
    pub fn new(url: impl Into<String>, watchdog: Duration) -> Self {
        Self {
            url: url.into(),
            watchdog,
        }
    }

    /// Drive `state` to a terminal phase.
    pub async fn run(self, state: SessionState) -> Result<Value, GatewayError> {
        // Bounded so the deadline stays representable.
        let watchdog = self.watchdog.min(MAX_TIMEOUT);
        let started = Instant::now();
        let deadline = started + watchdog;

        let ws = match tokio::time::timeout_at(
            deadline,
            tokio_tungstenite::connect_async(self.url.as_str()),
        )
        .await
        {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                warn!(url = %self.url, error = %e, "Gateway connection failed");
                return Err(GatewayError::Unreachable {
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(url = %self.url, "Gateway connection timed out");
                return Err(GatewayError::Timeout { elapsed: watchdog });
            }
        };
        debug!(url = %self.url, "Gateway connection open");

        let (mut sink, mut stream) = ws.split();
        let watchdog = tokio::time::sleep_until(deadline);
        tokio::pin!(watchdog);

        let mut state = state;
        let mut pending = Some(Event::Opened);

        loop {
            while let Some(event) = pending.take() {
                let (next, action) = state.step(event);
                state = next;
                match action {
                    Some(Action::Send(frame)) => {
                        let text = match serde_json::to_string(&frame) {
                            Ok(text) => text,
                            Err(e) => {
                                pending = Some(Event::ConnectionLost(format!(
                                    "failed to encode {} request: {e}",
                                    frame.method
                                )));
                                continue;
                            }
                        };
                        debug!(id = frame.id, method = frame.method, "Sending gateway request");
                        let send = sink.send(Message::Text(text.into()));
                        pending = match tokio::time::timeout_at(deadline, send).await {
                            Ok(Ok(())) => None,
                            Ok(Err(e)) => Some(Event::ConnectionLost(e.to_string())),
                            Err(_) => Some(Event::WatchdogElapsed),
                        };
                    }
                    Some(Action::Close) => {
                        if tokio::time::timeout(CLOSE_GRACE, sink.close()).await.is_err() {
                            debug!("Gateway close frame not flushed within grace period");
                        }
                    }
                    None => {}
                }
            }

            if state.is_terminal() {
                break;
            }

            pending = tokio::select! {
                () = &mut watchdog => Some(Event::WatchdogElapsed),
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => match InboundFrame::parse(&text) {
                        Ok(frame) => Some(Event::Frame(frame)),
                        Err(e) => {
                            warn!(
                                error = %e,
                                phase = state.phase().name(),
                                "Ignoring malformed gateway frame"
                            );
                            None
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        Some(Event::ConnectionLost("connection closed by worker".to_string()))
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => Some(Event::ConnectionLost(e.to_string())),
                },
            };
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let result = state.into_result();
        match &result {
            Ok(_) => info!(url = %self.url, elapsed_ms, "Gateway approval succeeded"),
            Err(e) => warn!(
                url = %self.url,
                elapsed_ms,
                error = %e,
                kind = e.kind(),
                "Gateway approval failed"
            ),
        }
        result
    }
}
