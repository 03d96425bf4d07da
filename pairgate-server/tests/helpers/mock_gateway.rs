//! Mock worker gateway speaking the challenge/connect/approve protocol.
//!
//! Accepts any number of WebSocket connections and counts them, so tests
//! can assert how many gateway attempts the relay made.

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

/// How the mock answers each connection.
#[derive(Debug, Clone, Copy)]
pub enum GatewayBehavior {
    /// challenge → connect ack → approve ack `{paired: true}`
    Approve,
    /// Accepts the socket and never sends a frame
    Silent,
}

pub struct MockGateway {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Value>>>,
    handle: JoinHandle<()>,
}

impl MockGateway {
    pub async fn start(behavior: GatewayBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let connections_task = connections.clone();
        let requests_task = requests.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                connections_task.fetch_add(1, Ordering::SeqCst);
                let requests = requests_task.clone();
                tokio::spawn(async move {
                    if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                        serve(ws, behavior, requests).await;
                    }
                });
            }
        });

        Self {
            addr,
            connections,
            requests,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Every request frame received, across all connections.
    pub async fn requests(&self) -> Vec<Value> {
        self.requests.lock().await.clone()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut ws: WebSocketStream<TcpStream>,
    behavior: GatewayBehavior,
    requests: Arc<Mutex<Vec<Value>>>,
) {
    if let GatewayBehavior::Approve = behavior {
        send(&mut ws, json!({"type": "challenge", "nonce": "abc"})).await;
        let Some(connect) = next_request(&mut ws, &requests).await else {
            return;
        };
        send(
            &mut ws,
            json!({
                "type": "res",
                "id": connect["id"],
                "ok": true,
                "payload": {"type": "hello-ok"}
            }),
        )
        .await;
        let Some(approve) = next_request(&mut ws, &requests).await else {
            return;
        };
        send(
            &mut ws,
            json!({"type": "res", "id": approve["id"], "ok": true, "payload": {"paired": true}}),
        )
        .await;
    }

    // Hold the socket open until the relay closes it.
    while let Some(Ok(msg)) = ws.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }
}

async fn next_request(
    ws: &mut WebSocketStream<TcpStream>,
    requests: &Mutex<Vec<Value>>,
) -> Option<Value> {
    while let Some(Ok(msg)) = ws.next().await {
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(&text).ok()?;
            requests.lock().await.push(value.clone());
            return Some(value);
        }
    }
    None
}

async fn send(ws: &mut WebSocketStream<TcpStream>, value: Value) {
    let _ = ws.send(Message::Text(value.to_string().into())).await;
}
