//! Gateway wire frames.
//!
//! All frames are JSON text messages tagged by `type`:
//!
//! ```text
//! worker  → relay   {"type":"challenge"}
//! relay   → worker  {"type":"req","id":1,"method":"connect","params":{...}}
//! worker  → relay   {"type":"res","id":1,"ok":true,"payload":{...}}
//! relay   → worker  {"type":"req","id":2,"method":"node.pair.approve","params":{"channel":..,"code":..}}
//! worker  → relay   {"type":"res","id":2,"ok":true,"payload":{...}}
//! ```
//!
//! Inbound frame types this relay does not use (events, ticks) decode to
//! [`InboundFrame::Other`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version announced in the connect request.
pub const PROTOCOL_VERSION: u32 = 3;

/// Method name of the handshake request.
pub const CONNECT_METHOD: &str = "connect";

/// Method name of the approval request.
pub const APPROVE_METHOD: &str = "node.pair.approve";

/// A frame received from the worker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundFrame {
    /// Handshake challenge; the worker sends this first. The nonce is
    /// opaque and its type varies between worker versions.
    Challenge {
        #[serde(default)]
        nonce: Option<Value>,
    },
    /// Response to one of our requests.
    Res(ResponseFrame),
    /// Any other frame type.
    #[serde(other)]
    Other,
}

impl InboundFrame {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Body of a `res` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub error: Option<FrameError>,
}

impl ResponseFrame {
    /// Worker-supplied error message, or a placeholder.
    #[must_use]
    pub fn error_message(&self) -> String {
        self.error
            .as_ref()
            .and_then(|e| e.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Error object inside a failed response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrameError {
    /// String or numeric, depending on the worker.
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A request frame sent to the worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: RequestParams,
}

impl RequestFrame {
    pub(crate) fn new(id: u64, method: &'static str, params: RequestParams) -> Self {
        Self {
            kind: "req",
            id,
            method,
            params,
        }
    }
}

/// Parameters of an outbound request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestParams {
    Connect(ConnectParams),
    Approve(ApproveParams),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectParams {
    pub protocol: u32,
    pub client: ClientInfo,
    pub role: &'static str,
    pub scopes: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthParams>,
}

impl ConnectParams {
    /// Connect parameters for this relay's operator identity.
    #[must_use]
    pub fn operator(token: Option<String>) -> Self {
        Self {
            protocol: PROTOCOL_VERSION,
            client: ClientInfo::default(),
            role: "operator",
            scopes: vec!["operator.pairing"],
            auth: token.map(|token| AuthParams { token }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientInfo {
    pub name: &'static str,
    pub version: &'static str,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "pairgate",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Clone, PartialEq, Serialize)]
pub struct AuthParams {
    pub token: String,
}

impl std::fmt::Debug for AuthParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthParams")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApproveParams {
    pub channel: String,
    pub code: String,
}
