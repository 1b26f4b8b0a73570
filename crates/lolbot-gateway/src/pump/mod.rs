//! Event pump
//!
//! The single control loop that owns the connection, the session and the
//! reconnect policy. Reader and heartbeat tasks talk to it only through the
//! control queue.

mod control;
mod event_pump;
mod state;

pub use control::{ControlMessage, ControlReceiver, ControlSender};
pub use event_pump::{EventPump, PumpConfig, PumpHandle};
pub use state::PumpState;
