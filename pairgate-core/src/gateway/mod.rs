//! Gateway handshake: wire frames, the pure state machine, and the
//! WebSocket driver that runs it.

pub mod frame;
pub mod machine;
pub mod session;

pub use frame::{InboundFrame, RequestFrame, ResponseFrame};
pub use machine::{Action, Event, Phase, SessionState};
pub use session::{GatewaySession, GatewayTransport, WsGateway};
