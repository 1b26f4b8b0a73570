//! Session state
//!
//! Resumption token plus the last-seen sequence number. Owned and mutated
//! only by the event pump.

mod state;

pub use state::SessionState;
