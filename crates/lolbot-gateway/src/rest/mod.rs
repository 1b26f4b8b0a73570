//! REST client
//!
//! Just enough of the HTTP API to answer commands.

mod client;
mod error;

pub use client::RestClient;
pub use error::RestError;
