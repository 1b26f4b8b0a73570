//! # lolbot-core
//!
//! Platform value objects shared by every other crate: snowflake identifiers,
//! shard identity and the bot's immutable credentials.
//! This crate has no dependencies on the network or runtime.

pub mod credentials;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use credentials::{Credentials, CredentialsError, ShardInfo};
pub use value_objects::{Snowflake, SnowflakeParseError};
