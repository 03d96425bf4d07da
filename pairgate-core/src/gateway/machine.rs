//! Pure handshake state machine.
//!
//! [`SessionState::step`] maps `(state, event)` to `(state, action)` with no
//! I/O, so the protocol can be exercised by feeding synthetic events. The
//! async driver in `session.rs` owns the socket and the watchdog and only
//! translates between the wire and this machine.
//!
//! ```text
//! Connecting ──Opened──▶ AwaitingChallenge ──challenge──▶ AwaitingConnectAck
//!                                                             │ res(ok)
//!                                                             ▼
//!                              Done ◀──res(ok)── AwaitingApproveAck
//!
//! any non-terminal ──watchdog / connection lost / res(!ok)──▶ Failed
//! ```
//!
//! Terminal transitions emit [`Action::Close`] exactly once; terminal states
//! ignore every further event.

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::frame::{
    APPROVE_METHOD, ApproveParams, CONNECT_METHOD, ConnectParams, InboundFrame, RequestFrame,
    RequestParams, ResponseFrame,
};
use crate::error::GatewayError;

/// Current phase of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Connecting,
    AwaitingChallenge,
    AwaitingConnectAck { connect_id: u64 },
    AwaitingApproveAck { approve_id: u64 },
    Done(Value),
    Failed(GatewayError),
}

impl Phase {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed(_))
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::AwaitingChallenge => "awaiting_challenge",
            Self::AwaitingConnectAck { .. } => "awaiting_connect_ack",
            Self::AwaitingApproveAck { .. } => "awaiting_approve_ack",
            Self::Done(_) => "done",
            Self::Failed(_) => "failed",
        }
    }
}

/// Input to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The connection is open.
    Opened,
    /// A successfully decoded frame.
    Frame(InboundFrame),
    /// The session watchdog fired.
    WatchdogElapsed,
    /// The connection failed or was closed by the peer.
    ConnectionLost(String),
}

/// Output of a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send(RequestFrame),
    Close,
}

/// State of one gateway session.
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: Phase,
    next_id: u64,
    channel: String,
    code: String,
    auth_token: Option<String>,
    watchdog: Duration,
}

impl SessionState {
    /// Fresh session in `Connecting` with its own id sequence starting at 1.
    #[must_use]
    pub fn new(
        channel: impl Into<String>,
        code: impl Into<String>,
        auth_token: Option<String>,
        watchdog: Duration,
    ) -> Self {
        Self {
            phase: Phase::Connecting,
            next_id: 1,
            channel: channel.into(),
            code: code.into(),
            auth_token,
            watchdog,
        }
    }

    #[must_use]
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Consume the session and return its result.
    ///
    /// A non-terminal session is reported as unreachable.
    pub fn into_result(self) -> Result<Value, GatewayError> {
        match self.phase {
            Phase::Done(payload) => Ok(payload),
            Phase::Failed(err) => Err(err),
            other => Err(GatewayError::Unreachable {
                reason: format!("session ended in {}", other.name()),
            }),
        }
    }

    /// Apply one event.
    #[must_use]
    pub fn step(mut self, event: Event) -> (Self, Option<Action>) {
        if self.phase.is_terminal() {
            return (self, None);
        }

        let phase = std::mem::replace(&mut self.phase, Phase::Connecting);
        let (next, action) = match (phase, event) {
            (_, Event::WatchdogElapsed) => (
                Phase::Failed(GatewayError::Timeout {
                    elapsed: self.watchdog,
                }),
                Some(Action::Close),
            ),
            (_, Event::ConnectionLost(reason)) => (
                Phase::Failed(GatewayError::Unreachable { reason }),
                Some(Action::Close),
            ),

            (Phase::Connecting, Event::Opened) => (Phase::AwaitingChallenge, None),

            (Phase::AwaitingChallenge, Event::Frame(InboundFrame::Challenge { .. })) => {
                let params = ConnectParams::operator(self.auth_token.clone());
                let frame = self.request(CONNECT_METHOD, RequestParams::Connect(params));
                (
                    Phase::AwaitingConnectAck {
                        connect_id: frame.id,
                    },
                    Some(Action::Send(frame)),
                )
            }

            (Phase::AwaitingConnectAck { connect_id }, Event::Frame(InboundFrame::Res(res)))
                if res.id == connect_id =>
            {
                if res.ok {
                    let params = ApproveParams {
                        channel: self.channel.clone(),
                        code: self.code.clone(),
                    };
                    let frame = self.request(APPROVE_METHOD, RequestParams::Approve(params));
                    (
                        Phase::AwaitingApproveAck {
                            approve_id: frame.id,
                        },
                        Some(Action::Send(frame)),
                    )
                } else {
                    (rejected("connect", &res), Some(Action::Close))
                }
            }

            (Phase::AwaitingApproveAck { approve_id }, Event::Frame(InboundFrame::Res(res)))
                if res.id == approve_id =>
            {
                if res.ok {
                    (
                        Phase::Done(res.payload.unwrap_or(Value::Null)),
                        Some(Action::Close),
                    )
                } else {
                    (rejected("approve", &res), Some(Action::Close))
                }
            }

            (phase, event) => {
                debug!(phase = phase.name(), event = ?event, "Ignoring unexpected gateway event");
                (phase, None)
            }
        };

        self.phase = next;
        (self, action)
    }

    fn request(&mut self, method: &'static str, params: RequestParams) -> RequestFrame {
        let id = self.next_id;
        self.next_id += 1;
        RequestFrame::new(id, method, params)
    }
}

fn rejected(stage: &'static str, res: &ResponseFrame) -> Phase {
    Phase::Failed(GatewayError::Rejected {
        stage,
        message: res.error_message(),
    })
}
