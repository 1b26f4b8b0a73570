//! Connection handle
//!
//! Owns one socket. The send half sits behind a mutex so writes are never
//! interleaved; the receive half is used directly during the handshake and
//! then handed to the reader task.

use super::reader::{decode_frame, read_loop, Frame};
use crate::error::{GatewayError, GatewayResult};
use crate::pump::ControlSender;
use crate::protocol::GatewayMessage;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(super) type WsSink = SplitSink<WsStream, Message>;
pub(super) type WsSource = SplitStream<WsStream>;

/// How long `close` waits for the reader to notice before aborting it
const READER_GRACE: Duration = Duration::from_secs(2);

/// Bound on writing the close frame
const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Generation tag of a connection
///
/// Every control message produced by a connection's reader carries it, so
/// messages from a replaced connection can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The id of the connection that replaces this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Open a socket to `url`, failing if it takes longer than `timeout`
pub async fn connect(
    url: &str,
    timeout: Duration,
    id: ConnectionId,
) -> GatewayResult<ConnectionHandle> {
    tracing::debug!(connection = %id, url = %url, "Opening gateway socket");

    let (ws, _response) = tokio::time::timeout(timeout, connect_async(url))
        .await
        .map_err(|_| GatewayError::Connect(format!("timed out after {timeout:?}")))?
        .map_err(|e| GatewayError::Connect(e.to_string()))?;

    let (sink, stream) = ws.split();
    Ok(ConnectionHandle {
        id,
        sink: Arc::new(Mutex::new(sink)),
        stream: Some(stream),
        read_timeout: timeout,
        closed: Arc::new(AtomicBool::new(false)),
        reader: None,
    })
}

/// A live gateway socket
pub struct ConnectionHandle {
    id: ConnectionId,
    sink: Arc<Mutex<WsSink>>,
    /// Present until the reader task takes it over
    stream: Option<WsSource>,
    read_timeout: Duration,
    /// Set once the socket is being closed locally
    closed: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl ConnectionHandle {
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Maximum silence tolerated before the peer is considered gone
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_reading(&self) -> bool {
        self.reader.is_some()
    }

    /// Write one frame
    ///
    /// A write that does not complete within the read timeout fails with
    /// `GatewayError::Send`.
    pub async fn send(&self, message: &GatewayMessage) -> GatewayResult<()> {
        if self.is_closed() {
            return Err(GatewayError::Send("connection closed".to_string()));
        }

        let json = message.to_json()?;
        tracing::debug!(connection = %self.id, op = %message.op, "Sending frame");

        let write = async { self.sink.lock().await.send(Message::Text(json)).await };
        match tokio::time::timeout(self.read_timeout, write).await {
            Ok(sent) => sent.map_err(|e| GatewayError::Send(e.to_string())),
            Err(_) => Err(GatewayError::Send(format!(
                "write stalled for {:?}",
                self.read_timeout
            ))),
        }
    }

    /// Wait for the next decodable frame before the reader is started
    ///
    /// Used by the handshake. Control frames are skipped.
    pub async fn receive(&mut self, timeout: Duration) -> GatewayResult<GatewayMessage> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| GatewayError::Handshake("reader already started".to_string()))?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let next = tokio::time::timeout_at(deadline, stream.next())
                .await
                .map_err(|_| GatewayError::Timeout(timeout))?;

            match decode_frame(next) {
                Frame::Message(message) => return Ok(message),
                Frame::Undecodable(e) => return Err(GatewayError::Decode(e)),
                Frame::Skip => {}
                Frame::Closed(err) => return Err(err),
            }
        }
    }

    /// Hand the receive half to a reader task feeding `control`
    pub fn start_reader(&mut self, control: ControlSender) -> GatewayResult<()> {
        let stream = self
            .stream
            .take()
            .ok_or_else(|| GatewayError::Handshake("reader already started".to_string()))?;

        tracing::debug!(
            connection = %self.id,
            read_timeout_secs = self.read_timeout.as_secs(),
            "Starting reader"
        );

        self.reader = Some(tokio::spawn(read_loop(
            self.id,
            stream,
            self.read_timeout,
            Arc::clone(&self.closed),
            control,
        )));
        Ok(())
    }

    /// Close the socket and wait for the reader to exit
    ///
    /// Idempotent. The reader treats the resulting end of stream as a clean
    /// termination and reports nothing.
    pub async fn close(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::debug!(connection = %self.id, "Closing connection");

        let frame = CloseFrame {
            code: WsCloseCode::Normal,
            reason: "".into(),
        };
        let write = async { self.sink.lock().await.send(Message::Close(Some(frame))).await };
        match tokio::time::timeout(CLOSE_WRITE_TIMEOUT, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::trace!(connection = %self.id, error = %e, "Close frame not sent");
            }
            Err(_) => {
                tracing::debug!(connection = %self.id, "Close frame write stalled, giving up");
            }
        }

        if let Some(mut reader) = self.reader.take() {
            if tokio::time::timeout(READER_GRACE, &mut reader).await.is_err() {
                tracing::debug!(connection = %self.id, "Reader did not exit in time, aborting");
                reader.abort();
            }
        }
        self.stream = None;
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("read_timeout", &self.read_timeout)
            .field("closed", &self.is_closed())
            .field("reading", &self.is_reading())
            .finish()
    }
}
