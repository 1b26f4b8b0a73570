//! Gateway Integration Tests
//!
//! Runs the event pump against the in-process mock gateway over a real
//! socket: discovery, identify, heartbeats, resume and shutdown.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use integration_tests::*;
use lolbot_gateway::handshake::HandshakeNegotiator;
use lolbot_gateway::protocol::IdentifyProperties;
use lolbot_gateway::{EventPump, GatewayResult, PumpHandle};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(5);

struct RunningPump {
    handle: PumpHandle,
    task: JoinHandle<GatewayResult<()>>,
    handler: Arc<RecordingHandler>,
}

impl RunningPump {
    fn start(mock: &MockGateway) -> Self {
        Self::start_with(mock, pump_config(), |pump| pump)
    }

    fn start_with(
        mock: &MockGateway,
        config: lolbot_gateway::PumpConfig,
        customize: impl FnOnce(EventPump) -> EventPump,
    ) -> Self {
        let handler = Arc::new(RecordingHandler::new());
        let pump = customize(EventPump::new(
            config,
            credentials(),
            mock.resolver(),
            Arc::clone(&handler) as Arc<dyn lolbot_gateway::EventHandler>,
        ));
        let handle = pump.handle();
        let task = tokio::spawn(pump.run());
        Self {
            handle,
            task,
            handler,
        }
    }

    async fn wait_for_event(&self, event_type: &str) -> bool {
        eventually(WAIT, || {
            self.handler
                .event_types()
                .iter()
                .any(|t| t == event_type)
        })
        .await
    }

    async fn wait_for_sequence(&self, sequence: u64) -> bool {
        eventually(WAIT, || self.handler.has_sequence(sequence)).await
    }

    async fn stop(self) -> GatewayResult<()> {
        self.handle.shutdown();
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("pump stops in time")
            .expect("pump task does not panic")
    }
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_identify_and_ready() {
    let mock = MockGateway::start().await.expect("Failed to start mock gateway");
    let pump = RunningPump::start(&mock);

    assert!(mock.wait_for_op(2, 1, WAIT).await, "no identify sent");
    let identify = &mock.received_with_op(2)[0];
    assert_eq!(identify["d"]["token"], BOT_TOKEN);
    assert_eq!(identify["d"]["shard"], json!([0, 1]));
    assert_eq!(identify["d"]["compress"], false);

    assert!(pump.wait_for_event("READY").await);
    assert_eq!(mock.connection_count(), 1);

    pump.stop().await.unwrap();
}

#[tokio::test]
async fn test_custom_client_properties() {
    let mock = MockGateway::start().await.expect("Failed to start mock gateway");
    let config = pump_config();
    let negotiator = HandshakeNegotiator::new(credentials(), config.connect_timeout)
        .with_properties(IdentifyProperties::new().with_browser("integration-suite"));
    let pump = RunningPump::start_with(&mock, config, |pump| pump.with_negotiator(negotiator));

    assert!(mock.wait_for_op(2, 1, WAIT).await);
    let identify = &mock.received_with_op(2)[0];
    assert_eq!(identify["d"]["properties"]["$browser"], "integration-suite");
    assert_eq!(identify["d"]["token"], BOT_TOKEN);

    pump.stop().await.unwrap();
}

#[tokio::test]
async fn test_self_authored_messages_are_suppressed() {
    let mock = MockGateway::start().await.expect("Failed to start mock gateway");
    let pump = RunningPump::start(&mock);
    assert!(pump.wait_for_event("READY").await);

    mock.send(message_create(2, SELF_ID, "from myself"));
    mock.send(message_create(3, USER_ID, "from someone else"));

    assert!(pump.wait_for_sequence(3).await);
    assert_eq!(pump.handler.contents(), vec!["from someone else".to_string()]);
    assert!(!pump.handler.has_sequence(2));

    pump.stop().await.unwrap();
}

// ============================================================================
// Heartbeats
// ============================================================================

#[tokio::test]
async fn test_heartbeat_carries_last_sequence() {
    let mock = MockGateway::start().await.expect("Failed to start mock gateway");
    let pump = RunningPump::start(&mock);
    assert!(pump.wait_for_event("READY").await);

    mock.send(message_create(5, USER_ID, "hello"));
    assert!(pump.wait_for_sequence(5).await);

    let carried = eventually(WAIT, || {
        mock.received_with_op(1)
            .iter()
            .any(|frame| frame["d"] == json!(5))
    })
    .await;
    assert!(carried, "no heartbeat with the latest sequence");

    pump.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_heartbeat_ack_forces_resume() {
    let mock = MockGateway::start().await.expect("Failed to start mock gateway");
    let pump = RunningPump::start(&mock);
    assert!(pump.wait_for_event("READY").await);

    mock.set_ack_heartbeats(false);
    assert!(mock.wait_for_op(6, 1, Duration::from_secs(10)).await, "no resume after going quiet");
    assert!(mock.connection_count() >= 2);

    pump.stop().await.unwrap();
}

#[tokio::test]
async fn test_read_timeout_forces_resume() {
    let mock = MockGateway::start().await.expect("Failed to start mock gateway");
    let mut config = pump_config();
    config.require_heartbeat_ack = false;
    let pump = RunningPump::start_with(&mock, config, |pump| pump);
    assert!(pump.wait_for_event("READY").await);

    // Heartbeats keep going out but nothing comes back
    mock.set_ack_heartbeats(false);
    let silent_since = tokio::time::Instant::now();
    assert!(mock.wait_for_op(6, 1, Duration::from_secs(10)).await, "no resume after read timeout");

    // Read timeout is twice the 1 s interval; the last frame came at most one
    // interval before the mock went quiet
    assert!(silent_since.elapsed() >= Duration::from_secs(1));
    assert_eq!(mock.received_with_op(6)[0]["d"]["session_id"], SESSION_ID);
    assert_eq!(mock.received_with_op(2).len(), 1);

    pump.stop().await.unwrap();
}

// ============================================================================
// Reconnects
// ============================================================================

#[tokio::test]
async fn test_resume_after_dropped_connection() {
    let mock = MockGateway::start().await.expect("Failed to start mock gateway");
    let pump = RunningPump::start(&mock);
    assert!(pump.wait_for_event("READY").await);

    mock.send(message_create(7, USER_ID, "before the drop"));
    assert!(pump.wait_for_sequence(7).await);

    mock.drop_connections();
    assert!(mock.wait_for_op(6, 1, WAIT).await, "no resume sent");

    let resume = &mock.received_with_op(6)[0];
    assert_eq!(resume["d"]["token"], BOT_TOKEN);
    assert_eq!(resume["d"]["session_id"], SESSION_ID);
    assert_eq!(resume["d"]["seq"], 7);
    assert_eq!(mock.received_with_op(2).len(), 1);

    assert!(pump.wait_for_event("RESUMED").await);
    mock.send(message_create(8, USER_ID, "after the drop"));
    assert!(pump.wait_for_sequence(8).await);
    assert_eq!(mock.connection_count(), 2);

    pump.stop().await.unwrap();
}

#[tokio::test]
async fn test_server_requested_reconnect_resumes() {
    let mock = MockGateway::start().await.expect("Failed to start mock gateway");
    let pump = RunningPump::start(&mock);
    assert!(pump.wait_for_event("READY").await);

    mock.send(json!({ "op": 7, "d": null }));
    assert!(mock.wait_for_op(6, 1, WAIT).await);
    assert_eq!(mock.received_with_op(6)[0]["d"]["seq"], 1);

    pump.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_session_identifies_again() {
    let mock = MockGateway::start().await.expect("Failed to start mock gateway");
    let pump = RunningPump::start(&mock);
    assert!(pump.wait_for_event("READY").await);

    mock.send(json!({ "op": 9, "d": false }));
    assert!(mock.wait_for_op(2, 2, WAIT).await, "no second identify");
    assert!(mock.received_with_op(6).is_empty());
    assert_eq!(mock.received_ops(), vec![2, 2]);

    pump.stop().await.unwrap();
}

#[tokio::test]
async fn test_session_timeout_close_identifies_again() {
    let mock = MockGateway::start().await.expect("Failed to start mock gateway");
    let pump = RunningPump::start(&mock);
    assert!(pump.wait_for_event("READY").await);

    mock.close(4009, "Session timed out");
    assert!(mock.wait_for_op(2, 2, WAIT).await);
    assert!(mock.received_with_op(6).is_empty());

    pump.stop().await.unwrap();
}

#[tokio::test]
async fn test_authentication_failure_is_fatal() {
    let mock = MockGateway::start().await.expect("Failed to start mock gateway");
    let pump = RunningPump::start(&mock);
    assert!(mock.wait_for_op(2, 1, WAIT).await);

    mock.close(4004, "Authentication failed");
    let result = tokio::time::timeout(WAIT, pump.task)
        .await
        .expect("pump stops in time")
        .expect("pump task does not panic");

    let err = result.expect_err("a rejected token ends the pump");
    assert!(err.is_fatal());
    assert_eq!(mock.connection_count(), 1);

    let app: lolbot_common::AppError = err.into();
    assert_eq!(app.exit_code(), 78);
}

// ============================================================================
// Handlers and shutdown
// ============================================================================

#[tokio::test]
async fn test_panicking_handler_does_not_stop_pump() {
    let mock = MockGateway::start().await.expect("Failed to start mock gateway");
    let pump = RunningPump::start(&mock);
    assert!(pump.wait_for_event("READY").await);

    mock.send(message_create(2, USER_ID, PANIC_CONTENT));
    mock.send(message_create(3, USER_ID, "still here"));

    assert!(pump.wait_for_sequence(3).await);
    assert!(!pump.handler.has_sequence(2));
    assert_eq!(mock.connection_count(), 1);

    pump.stop().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_connection() {
    let mock = MockGateway::start().await.expect("Failed to start mock gateway");
    let pump = RunningPump::start(&mock);
    assert!(pump.wait_for_event("READY").await);
    assert_eq!(mock.open_connections(), 1);

    pump.stop().await.unwrap();

    assert!(eventually(WAIT, || mock.open_connections() == 0).await);
    assert_eq!(mock.connection_count(), 1);
}

#[tokio::test]
async fn test_shutdown_interrupts_reconnect_backoff() {
    let mock = MockGateway::start().await.expect("Failed to start mock gateway");
    let handler = Arc::new(RecordingHandler::new());
    let mut config = pump_config();
    config.reconnect_initial_delay = Duration::from_secs(30);
    config.reconnect_max_delay = Duration::from_secs(30);

    let pump = EventPump::new(config, credentials(), mock.resolver(), handler.clone());
    let handle = pump.handle();
    let task = tokio::spawn(pump.run());

    assert!(eventually(WAIT, || handler.event_types().contains(&"READY".to_string())).await);
    mock.drop_connections();
    assert!(eventually(WAIT, || mock.open_connections() == 0).await);

    handle.shutdown();
    let result = tokio::time::timeout(WAIT, task)
        .await
        .expect("shutdown does not wait out the backoff")
        .expect("pump task does not panic");
    assert!(result.is_ok());
}
