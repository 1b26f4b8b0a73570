//! WebSocket transport
//!
//! One physical socket per `ConnectionHandle`, plus the reader task that
//! feeds decoded frames into the pump's control queue.

mod connection;
mod reader;

pub use connection::{connect, ConnectionHandle, ConnectionId};
