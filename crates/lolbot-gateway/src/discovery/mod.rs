//! Gateway endpoint discovery
//!
//! Resolves the socket URL the transport connects to.

mod endpoint;
mod resolver;

pub use endpoint::GatewayEndpoint;
pub use resolver::{EndpointResolver, HttpEndpointResolver, StaticEndpointResolver};
