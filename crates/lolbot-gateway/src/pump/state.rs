//! Pump lifecycle states

use std::fmt;

/// Where the pump is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PumpState {
    #[default]
    Idle,
    Connecting,
    Ready,
    ReconnectPending,
    ShuttingDown,
}

impl PumpState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::ReconnectPending => "reconnect_pending",
            Self::ShuttingDown => "shutting_down",
        }
    }

    /// Whether a live connection is expected
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for PumpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
