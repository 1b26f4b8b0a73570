//! Control queue messages

use crate::error::GatewayError;
use crate::protocol::GatewayMessage;
use crate::transport::ConnectionId;
use tokio::sync::mpsc;

/// Everything the pump reacts to
#[derive(Debug)]
pub enum ControlMessage {
    /// Decoded frame from a connection's reader
    Inbound {
        connection: ConnectionId,
        message: GatewayMessage,
    },
    /// Heartbeat timer fired for a connection
    HeartbeatDue { connection: ConnectionId },
    /// A connection's reader stopped
    TransportError {
        connection: ConnectionId,
        error: GatewayError,
    },
    /// Drop the current connection and reconnect
    ReconnectNow,
    Shutdown,
}

impl ControlMessage {
    /// The connection this message belongs to, if it belongs to one
    #[must_use]
    pub fn connection(&self) -> Option<ConnectionId> {
        match self {
            Self::Inbound { connection, .. }
            | Self::HeartbeatDue { connection }
            | Self::TransportError { connection, .. } => Some(*connection),
            Self::ReconnectNow | Self::Shutdown => None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Inbound { .. } => "inbound",
            Self::HeartbeatDue { .. } => "heartbeat_due",
            Self::TransportError { .. } => "transport_error",
            Self::ReconnectNow => "reconnect_now",
            Self::Shutdown => "shutdown",
        }
    }
}

pub type ControlSender = mpsc::UnboundedSender<ControlMessage>;
pub type ControlReceiver = mpsc::UnboundedReceiver<ControlMessage>;
