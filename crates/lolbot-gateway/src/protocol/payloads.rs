//! Handshake payload definitions
//!
//! The `d` bodies of Hello, Identify, Resume and the READY dispatch.

use lolbot_core::ShardInfo;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Payload for op 10 (Hello)
///
/// Sent by the server immediately after connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

impl HelloPayload {
    /// Shortest heartbeat period the client will run
    pub const MIN_HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self { heartbeat_interval }
    }

    /// Heartbeat period, rounded down to whole seconds and never below one second
    #[must_use]
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval / 1000).max(Self::MIN_HEARTBEAT_PERIOD)
    }
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Bot token
    pub token: String,

    /// Client properties
    pub properties: IdentifyProperties,

    /// Payload compression (never requested)
    pub compress: bool,

    /// Member count above which offline members are not sent
    pub large_threshold: u32,

    /// `[shard_index, shard_count]`
    pub shard: [u32; 2],
}

impl IdentifyPayload {
    /// Default large guild threshold
    pub const DEFAULT_LARGE_THRESHOLD: u32 = 250;

    #[must_use]
    pub fn new(token: impl Into<String>, properties: IdentifyProperties, shard: ShardInfo) -> Self {
        Self {
            token: token.into(),
            properties,
            compress: false,
            large_threshold: Self::DEFAULT_LARGE_THRESHOLD,
            shard: [shard.index(), shard.count()],
        }
    }
}

/// Client connection properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    #[serde(rename = "$os")]
    pub os: String,

    /// Library name
    #[serde(rename = "$browser")]
    pub browser: String,

    /// Device name
    #[serde(rename = "$device")]
    pub device: String,

    #[serde(rename = "$referrer", default)]
    pub referrer: String,

    #[serde(rename = "$referring_domain", default)]
    pub referring_domain: String,
}

impl IdentifyProperties {
    /// Properties describing this client on the current platform
    #[must_use]
    pub fn new() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "lolbot".to_string(),
            device: "lolbot".to_string(),
            referrer: String::new(),
            referring_domain: String::new(),
        }
    }

    /// Set operating system
    #[must_use]
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    /// Set browser (library) name
    #[must_use]
    pub fn with_browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = browser.into();
        self
    }

    /// Set device name
    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Bot token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}

/// The parts of the READY dispatch the gateway cares about
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    /// Session ID to use for later resumes
    pub session_id: String,

    /// Protocol version the server settled on
    #[serde(default)]
    pub v: Option<u32>,
}
