//! Heartbeat scheduling
//!
//! A single timer task that lives across reconnects and enqueues
//! `HeartbeatDue` for the current connection. It never writes to the socket.

mod scheduler;

pub use scheduler::{HeartbeatScheduler, HeartbeatTarget};
