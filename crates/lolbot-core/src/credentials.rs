//! Bot credentials and shard identity
//!
//! Immutable for the lifetime of the process. The token is only ever passed
//! through to the gateway handshake and the REST authorization header.

use crate::Snowflake;
use serde::{Serialize, Serializer};
use std::fmt;

/// Shard identity sent in Identify as `[index, count]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardInfo {
    index: u32,
    count: u32,
}

impl ShardInfo {
    /// A single-shard bot
    pub const SINGLE: Self = Self { index: 0, count: 1 };

    /// Create a shard identity, validating `index < count`
    pub fn new(index: u32, count: u32) -> Result<Self, CredentialsError> {
        if count == 0 || index >= count {
            return Err(CredentialsError::InvalidShard { index, count });
        }
        Ok(Self { index, count })
    }

    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn count(&self) -> u32 {
        self.count
    }
}

impl Default for ShardInfo {
    fn default() -> Self {
        Self::SINGLE
    }
}

impl Serialize for ShardInfo {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        [self.index, self.count].serialize(serializer)
    }
}

impl fmt::Display for ShardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.index, self.count)
    }
}

/// Credentials used to log in to the gateway
#[derive(Clone)]
pub struct Credentials {
    token: String,
    self_id: Snowflake,
    shard: ShardInfo,
}

impl Credentials {
    /// Create credentials; an empty or whitespace-only token is rejected
    pub fn new(
        token: impl Into<String>,
        self_id: Snowflake,
        shard: ShardInfo,
    ) -> Result<Self, CredentialsError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(CredentialsError::EmptyToken);
        }
        Ok(Self {
            token,
            self_id,
            shard,
        })
    }

    /// The bearer token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The bot's own user id, used to suppress self-authored events
    pub fn self_id(&self) -> Snowflake {
        self.self_id
    }

    pub fn shard(&self) -> ShardInfo {
        self.shard
    }

    /// Whether a usable token is present
    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

// Never print the token
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("self_id", &self.self_id)
            .field("shard", &self.shard)
            .finish()
    }
}

/// Credential validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialsError {
    #[error("bot token is missing or empty")]
    EmptyToken,

    #[error("invalid shard [{index}, {count}]: index must be below count")]
    InvalidShard { index: u32, count: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_validation() {
        assert!(ShardInfo::new(0, 1).is_ok());
        assert!(ShardInfo::new(3, 4).is_ok());
        assert_eq!(
            ShardInfo::new(4, 4),
            Err(CredentialsError::InvalidShard { index: 4, count: 4 })
        );
        assert!(ShardInfo::new(0, 0).is_err());
    }

    #[test]
    fn test_shard_serialization() {
        let shard = ShardInfo::new(2, 5).unwrap();
        assert_eq!(serde_json::to_string(&shard).unwrap(), "[2,5]");
        assert_eq!(shard.to_string(), "[2, 5]");
    }

    #[test]
    fn test_credentials_reject_empty_token() {
        let err = Credentials::new("   ", Snowflake::new(1), ShardInfo::SINGLE).unwrap_err();
        assert_eq!(err, CredentialsError::EmptyToken);
    }

    #[test]
    fn test_credentials_debug_redacts_token() {
        let creds = Credentials::new("secret-token", Snowflake::new(7), ShardInfo::SINGLE).unwrap();
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("redacted"));
        assert!(creds.has_token());
        assert_eq!(creds.self_id(), Snowflake::new(7));
    }
}
