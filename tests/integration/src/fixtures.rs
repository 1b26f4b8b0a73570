//! Test fixtures
//!
//! Credentials, pump tuning and dispatch frames shared by the end-to-end
//! tests, plus a handler that records what it is given.

use async_trait::async_trait;
use lolbot_core::{Credentials, ShardInfo, Snowflake};
use lolbot_gateway::{DispatchEvent, EventHandler, HandlerError, PumpConfig};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::time::Duration;

pub const BOT_TOKEN: &str = "test-token";
pub const SELF_ID: u64 = 1_000;
pub const USER_ID: u64 = 2_000;
pub const CHANNEL_ID: u64 = 3_000;

/// Message content that makes `RecordingHandler` panic
pub const PANIC_CONTENT: &str = "explode";

pub fn credentials() -> Credentials {
    Credentials::new(BOT_TOKEN, Snowflake::new(SELF_ID), ShardInfo::SINGLE)
        .expect("test credentials are valid")
}

/// Pump tuning with short reconnect delays
pub fn pump_config() -> PumpConfig {
    PumpConfig {
        connect_timeout: Duration::from_secs(5),
        require_heartbeat_ack: true,
        reconnect_initial_delay: Duration::from_millis(50),
        reconnect_max_delay: Duration::from_millis(200),
        max_concurrency: 4,
        shutdown_grace: Duration::from_secs(1),
    }
}

/// A MESSAGE_CREATE dispatch frame
pub fn message_create(sequence: u64, author_id: u64, content: &str) -> Value {
    json!({
        "op": 0,
        "t": "MESSAGE_CREATE",
        "s": sequence,
        "d": {
            "id": (10_000 + sequence).to_string(),
            "channel_id": CHANNEL_ID.to_string(),
            "content": content,
            "author": { "id": author_id.to_string(), "bot": false }
        }
    })
}

/// Handler that keeps every event it receives
#[derive(Debug, Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<DispatchEvent>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events.lock().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|event| event.event_type.clone())
            .collect()
    }

    /// Contents of received MESSAGE_CREATE events
    pub fn contents(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| event.content().map(str::to_string))
            .collect()
    }

    pub fn has_sequence(&self, sequence: u64) -> bool {
        self.events
            .lock()
            .iter()
            .any(|event| event.sequence == Some(sequence))
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &DispatchEvent) -> Result<(), HandlerError> {
        if event.content() == Some(PANIC_CONTENT) {
            panic!("handler failed on purpose");
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}
