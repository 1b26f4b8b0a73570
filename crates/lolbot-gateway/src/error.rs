//! Gateway error types
//!
//! Every connectivity failure is one of these. The orchestrator recovers from
//! all of them locally except the ones `is_fatal` reports.

use crate::protocol::CloseCode;
use lolbot_common::AppError;
use std::time::Duration;
use thiserror::Error;

/// Gateway error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or unusable configuration (never retried)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Endpoint discovery failed
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// Socket could not be opened
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Opening exchange failed (no hello, malformed hello, ...)
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Server closed the connection
    #[error("Connection closed by server (code {code:?}): {reason}")]
    Closed { code: Option<u16>, reason: String },

    /// Nothing received within the read timeout
    #[error("No frame received within {0:?}")]
    Timeout(Duration),

    /// Heartbeat was not acknowledged before the next one was due
    #[error("Heartbeat not acknowledged, connection zombied")]
    Zombied,

    /// Frame could not be written
    #[error("Send failed: {0}")]
    Send(String),

    /// Frame could not be encoded or decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl GatewayError {
    /// Build a `Closed` error from a raw close frame
    pub fn closed(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Closed {
            code,
            reason: reason.into(),
        }
    }

    /// The gateway close code, if the server sent a known one
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::Closed { code: Some(code), .. } => CloseCode::from_u16(*code),
            _ => None,
        }
    }

    /// Whether the process must stop instead of reconnecting
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Config(_) => true,
            Self::Closed { .. } => self.close_code().is_some_and(|c| !c.should_reconnect()),
            _ => false,
        }
    }

    /// Whether the stored session must be dropped before reconnecting
    #[must_use]
    pub fn invalidates_session(&self) -> bool {
        self.close_code().is_some_and(CloseCode::invalidates_session)
    }

    /// Whether this error only means the peer went quiet
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Zombied)
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Config(msg) => Self::Misconfigured(msg),
            closed @ GatewayError::Closed { .. } if closed.is_fatal() => {
                Self::Misconfigured(closed.to_string())
            }
            other => Self::Internal(other.into()),
        }
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
