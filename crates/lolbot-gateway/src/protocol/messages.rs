//! Gateway message format
//!
//! Defines the envelope shared by every frame on the socket.

use super::{HelloPayload, IdentifyPayload, OpCode, ReadyPayload, ResumePayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway message format
///
/// All messages sent over the WebSocket connection follow this format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event data payload (`null` when absent)
    #[serde(default)]
    pub d: Value,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event type (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayMessage {
    /// Event type of the READY dispatch
    pub const READY: &'static str = "READY";
    /// Event type of the RESUMED dispatch
    pub const RESUMED: &'static str = "RESUMED";

    fn with_data(op: OpCode, d: Value) -> Self {
        Self {
            op,
            d,
            s: None,
            t: None,
        }
    }

    // === Client Messages ===

    /// Create an Identify message (op=2)
    #[must_use]
    pub fn identify(payload: &IdentifyPayload) -> Self {
        Self::with_data(
            OpCode::Identify,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    /// Create a Resume message (op=6)
    #[must_use]
    pub fn resume(payload: &ResumePayload) -> Self {
        Self::with_data(OpCode::Resume, serde_json::to_value(payload).unwrap_or_default())
    }

    /// Create a Heartbeat message (op=1) carrying the last sequence, or `null`
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::with_data(
            OpCode::Heartbeat,
            last_sequence.map_or(Value::Null, |s| Value::Number(s.into())),
        )
    }

    // === Server Messages ===

    /// Create a Dispatch message (op=0)
    #[must_use]
    pub fn dispatch(event_type: impl Into<String>, sequence: Option<u64>, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            d: data,
            s: sequence,
            t: Some(event_type.into()),
        }
    }

    /// Create a Hello message (op=10)
    #[must_use]
    pub fn hello(payload: &HelloPayload) -> Self {
        Self::with_data(OpCode::Hello, serde_json::to_value(payload).unwrap_or_default())
    }

    // === Parsing Server Messages ===

    /// Try to parse as a Hello payload (op=10)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        if self.op != OpCode::Hello {
            return None;
        }
        serde_json::from_value(self.d.clone()).ok()
    }

    /// Try to parse as the READY dispatch
    pub fn as_ready(&self) -> Option<ReadyPayload> {
        if !self.is_dispatch_of(Self::READY) {
            return None;
        }
        serde_json::from_value(self.d.clone()).ok()
    }

    /// Whether this is a dispatch with the given event type
    #[must_use]
    pub fn is_dispatch_of(&self, event_type: &str) -> bool {
        self.op == OpCode::Dispatch && self.t.as_deref() == Some(event_type)
    }

    /// The `resumable` flag of an Invalid Session message (op=9)
    pub fn as_invalid_session(&self) -> Option<bool> {
        if self.op != OpCode::InvalidSession {
            return None;
        }
        Some(self.d.as_bool().unwrap_or(false))
    }

    // === Utilities ===

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}
