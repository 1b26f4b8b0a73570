//! Mock gateway server
//!
//! A local axum server speaking enough of the gateway protocol to drive the
//! event pump end to end: discovery, Hello, READY/RESUMED and heartbeat ACKs.
//! Tests push frames, close codes and abrupt drops through it.

use anyhow::Result;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use lolbot_gateway::{EndpointResolver, HttpEndpointResolver};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Session id handed out in every READY
pub const SESSION_ID: &str = "abc";

/// Heartbeat interval announced in Hello
pub const HEARTBEAT_INTERVAL_MS: u64 = 1_000;

pub const GATEWAY_VERSION: &str = "6";

/// How often `eventually` re-checks its condition
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
enum ServerCommand {
    Send(Value),
    Close(u16, String),
    Drop,
}

struct MockState {
    ws_url: String,
    received: Mutex<Vec<Value>>,
    connections: AtomicUsize,
    open: AtomicUsize,
    ack_heartbeats: AtomicBool,
    commands: broadcast::Sender<ServerCommand>,
}

impl MockState {
    /// Scripted reply to a client frame
    fn reply_to(&self, frame: &Value) -> Option<Value> {
        match frame["op"].as_u64()? {
            1 if self.ack_heartbeats.load(Ordering::SeqCst) => Some(json!({ "op": 11 })),
            2 => Some(json!({
                "op": 0,
                "t": "READY",
                "s": 1,
                "d": { "session_id": SESSION_ID, "v": 6 }
            })),
            6 => Some(json!({ "op": 0, "t": "RESUMED", "d": {} })),
            _ => None,
        }
    }
}

/// Running mock gateway
pub struct MockGateway {
    addr: SocketAddr,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockGateway {
    /// Start the server on an ephemeral local port
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (commands, _) = broadcast::channel(64);
        let state = Arc::new(MockState {
            ws_url: format!("ws://{addr}"),
            received: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            open: AtomicUsize::new(0),
            ack_heartbeats: AtomicBool::new(true),
            commands,
        });

        let app = Router::new()
            .route("/api/gateway", get(discovery))
            .route("/", get(upgrade))
            .with_state(Arc::clone(&state));

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("mock gateway stopped: {e}");
            }
        });

        Ok(Self {
            addr,
            state,
            server,
        })
    }

    /// REST base URL; discovery lives at `{base}/gateway`
    pub fn api_base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Resolver that discovers this server over HTTP
    pub fn resolver(&self) -> Arc<dyn EndpointResolver> {
        Arc::new(HttpEndpointResolver::with_client(
            reqwest::Client::new(),
            &self.api_base_url(),
            GATEWAY_VERSION,
        ))
    }

    /// Send a raw frame on every open connection
    pub fn send(&self, frame: Value) {
        let _ = self.state.commands.send(ServerCommand::Send(frame));
    }

    /// Close every open connection with a close code
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self
            .state
            .commands
            .send(ServerCommand::Close(code, reason.to_string()));
    }

    /// Drop every open connection without a closing handshake
    pub fn drop_connections(&self) {
        let _ = self.state.commands.send(ServerCommand::Drop);
    }

    /// Stop answering heartbeats
    pub fn set_ack_heartbeats(&self, ack: bool) {
        self.state.ack_heartbeats.store(ack, Ordering::SeqCst);
    }

    /// Every frame clients sent, in arrival order
    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().clone()
    }

    /// Received frames with the given op code
    pub fn received_with_op(&self, op: u64) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|frame| frame["op"].as_u64() == Some(op))
            .collect()
    }

    /// Op codes of every received frame, heartbeats excluded
    pub fn received_ops(&self) -> Vec<u64> {
        self.received()
            .iter()
            .filter_map(|frame| frame["op"].as_u64())
            .filter(|&op| op != 1)
            .collect()
    }

    /// Connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Connections currently open
    pub fn open_connections(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    /// Wait until `count` frames with `op` have arrived
    pub async fn wait_for_op(&self, op: u64, count: usize, timeout: Duration) -> bool {
        eventually(timeout, || self.received_with_op(op).len() >= count).await
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn discovery(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    Json(json!({ "url": state.ws_url }))
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<MockState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_connection(socket, state))
}

async fn serve_connection(mut socket: WebSocket, state: Arc<MockState>) {
    let mut commands = state.commands.subscribe();
    state.connections.fetch_add(1, Ordering::SeqCst);
    state.open.fetch_add(1, Ordering::SeqCst);

    let hello = json!({ "op": 10, "d": { "heartbeat_interval": HEARTBEAT_INTERVAL_MS } });
    if send_json(&mut socket, &hello).await {
        loop {
            tokio::select! {
                inbound = socket.recv() => {
                    let Some(Ok(message)) = inbound else { break };
                    match message {
                        Message::Text(text) => {
                            let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                                continue;
                            };
                            let reply = state.reply_to(&frame);
                            state.received.lock().push(frame);
                            if let Some(reply) = reply {
                                if !send_json(&mut socket, &reply).await {
                                    break;
                                }
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                command = commands.recv() => match command {
                    Ok(ServerCommand::Send(frame)) => {
                        if !send_json(&mut socket, &frame).await {
                            break;
                        }
                    }
                    Ok(ServerCommand::Close(code, reason)) => {
                        let frame = CloseFrame { code, reason: reason.into() };
                        let _ = socket.send(Message::Close(Some(frame))).await;
                        break;
                    }
                    Ok(ServerCommand::Drop) | Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(_)) => {}
                },
            }
        }
    }

    state.open.fetch_sub(1, Ordering::SeqCst);
}

async fn send_json(socket: &mut WebSocket, frame: &Value) -> bool {
    socket.send(Message::Text(frame.to_string())).await.is_ok()
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
