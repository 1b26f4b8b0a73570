//! Dispatch events and the handler seam

use crate::protocol::{GatewayMessage, OpCode};
use crate::rest::RestError;
use async_trait::async_trait;
use lolbot_core::Snowflake;
use serde_json::Value;

/// One opcode-0 frame, as handed downstream
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchEvent {
    pub event_type: String,
    pub payload: Value,
    pub sequence: Option<u64>,
}

impl DispatchEvent {
    #[must_use]
    pub fn new(event_type: impl Into<String>, payload: Value, sequence: Option<u64>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            sequence,
        }
    }

    /// Extract the event from a dispatch frame
    ///
    /// Returns `None` for other opcodes and for dispatches without a type.
    #[must_use]
    pub fn from_message(message: GatewayMessage) -> Option<Self> {
        if message.op != OpCode::Dispatch {
            return None;
        }
        let event_type = message.t?;
        Some(Self::new(event_type, message.d, message.s))
    }

    #[must_use]
    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }

    /// `d.author.id`, if present
    #[must_use]
    pub fn author_id(&self) -> Option<Snowflake> {
        self.payload
            .get("author")
            .and_then(|author| author.get("id"))
            .and_then(Snowflake::from_json)
    }

    #[must_use]
    pub fn is_authored_by(&self, user_id: Snowflake) -> bool {
        self.author_id() == Some(user_id)
    }

    /// Whether the author is flagged as a bot account
    #[must_use]
    pub fn author_is_bot(&self) -> bool {
        self.payload
            .get("author")
            .and_then(|author| author.get("bot"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn channel_id(&self) -> Option<Snowflake> {
        self.payload.get("channel_id").and_then(Snowflake::from_json)
    }

    /// Message text of a MESSAGE_CREATE
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.payload.get("content").and_then(Value::as_str)
    }
}

/// Handler errors
///
/// Logged by the dispatcher, never propagated to the pump.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Event is missing {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Rest(#[from] RestError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Receiver of dispatch events
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: &DispatchEvent) -> Result<(), HandlerError>;
}
