//! Opening exchange
//!
//! Await Hello, then Identify or Resume depending on the stored session.

mod negotiator;

pub use negotiator::{
    build_login, parse_hello, HandshakeKind, HandshakeNegotiator, HandshakeOutcome, HandshakePhase,
};
