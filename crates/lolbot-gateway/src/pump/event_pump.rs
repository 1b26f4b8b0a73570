//! The orchestrator
//!
//! Owns the connection handle, the session and every reconnect decision.
//! All socket writes happen here; the reader and heartbeat tasks only enqueue
//! control messages, and messages tagged with a replaced connection are
//! dropped on arrival.

use super::{ControlMessage, ControlReceiver, ControlSender, PumpState};
use crate::backoff::Backoff;
use crate::discovery::{EndpointResolver, GatewayEndpoint};
use crate::dispatch::{DispatchEvent, Dispatcher, EventHandler};
use crate::error::{GatewayError, GatewayResult};
use crate::handshake::{HandshakeKind, HandshakeNegotiator};
use crate::heartbeat::HeartbeatScheduler;
use crate::protocol::{GatewayMessage, OpCode};
use crate::session::SessionState;
use crate::transport::{self, ConnectionHandle, ConnectionId};
use lolbot_common::AppConfig;
use lolbot_core::Credentials;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Bound on socket connect and on waiting for Hello
    pub connect_timeout: Duration,
    /// Treat a missing heartbeat ACK as a dead connection
    pub require_heartbeat_ack: bool,
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub max_concurrency: usize,
    /// How long shutdown waits for running handlers
    pub shutdown_grace: Duration,
}

impl PumpConfig {
    #[must_use]
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            connect_timeout: config.gateway.connect_timeout(),
            require_heartbeat_ack: config.gateway.require_heartbeat_ack,
            reconnect_initial_delay: config.gateway.reconnect_initial_delay(),
            reconnect_max_delay: config.gateway.reconnect_max_delay(),
            max_concurrency: config.dispatch.max_concurrency,
            ..Self::default()
        }
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            require_heartbeat_ack: true,
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(60),
            max_concurrency: 16,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Cloneable remote control for a running pump
#[derive(Debug, Clone)]
pub struct PumpHandle {
    control: ControlSender,
    shutdown: Arc<watch::Sender<bool>>,
}

impl PumpHandle {
    /// Ask the pump to close the connection and stop
    ///
    /// Also interrupts a pending backoff or connection attempt.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let _ = self.control.send(ControlMessage::Shutdown);
    }

    /// Ask the pump to drop the current connection and reconnect
    pub fn reconnect(&self) {
        let _ = self.control.send(ControlMessage::ReconnectNow);
    }

    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Why the ready loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Reconnect,
    Shutdown,
}

/// Result of one connection attempt that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Connected,
    Interrupted,
}

/// The gateway event pump
pub struct EventPump {
    config: PumpConfig,
    credentials: Credentials,
    negotiator: HandshakeNegotiator,
    resolver: Arc<dyn EndpointResolver>,
    handler: Arc<dyn EventHandler>,

    state: PumpState,
    session: SessionState,
    backoff: Backoff,

    control_tx: ControlSender,
    control_rx: ControlReceiver,
    shutdown: Arc<watch::Sender<bool>>,

    connection: Option<ConnectionHandle>,
    /// Id of the connection whose messages are accepted
    current: Option<ConnectionId>,
    next_id: ConnectionId,
    /// Endpoint of the last established connection, tried first when resuming
    endpoint: Option<GatewayEndpoint>,
    awaiting_ack: bool,

    heartbeat: Option<HeartbeatScheduler>,
    dispatcher: Option<Dispatcher>,
}

impl EventPump {
    pub fn new(
        config: PumpConfig,
        credentials: Credentials,
        resolver: Arc<dyn EndpointResolver>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        Self {
            negotiator: HandshakeNegotiator::new(credentials.clone(), config.connect_timeout),
            backoff: Backoff::new(config.reconnect_initial_delay, config.reconnect_max_delay),
            config,
            credentials,
            resolver,
            handler,
            state: PumpState::Idle,
            session: SessionState::new(),
            control_tx,
            control_rx,
            shutdown: Arc::new(shutdown),
            connection: None,
            current: None,
            next_id: ConnectionId::new(1),
            endpoint: None,
            awaiting_ack: false,
            heartbeat: None,
            dispatcher: None,
        }
    }

    /// Replace the handshake negotiator (e.g. for custom client properties)
    #[must_use]
    pub fn with_negotiator(mut self, negotiator: HandshakeNegotiator) -> Self {
        self.negotiator = negotiator;
        self
    }

    #[must_use]
    pub fn handle(&self) -> PumpHandle {
        PumpHandle {
            control: self.control_tx.clone(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    #[must_use]
    pub fn state(&self) -> PumpState {
        self.state
    }

    #[must_use]
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Connect and process events until shutdown or a fatal error
    ///
    /// Every transient failure is retried under backoff. On return the
    /// socket is closed and all background tasks have exited.
    pub async fn run(mut self) -> GatewayResult<()> {
        tracing::info!(
            shard = %self.credentials.shard(),
            self_id = %self.credentials.self_id(),
            "Event pump starting"
        );

        self.heartbeat = Some(HeartbeatScheduler::spawn(self.control_tx.clone()));
        self.dispatcher = Some(Dispatcher::spawn(
            Arc::clone(&self.handler),
            self.config.max_concurrency,
        ));

        let result = self.run_loop().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Event pump stopped on fatal error");
        }

        self.shutdown().await;
        result
    }

    async fn run_loop(&mut self) -> GatewayResult<()> {
        loop {
            if self.shutdown_requested() {
                return Ok(());
            }

            self.transition(PumpState::Connecting);
            match self.connect().await {
                Ok(Attempt::Connected) => {}
                Ok(Attempt::Interrupted) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Connection attempt failed");
                    if e.invalidates_session() {
                        self.session.clear();
                    }
                    self.transition(PumpState::ReconnectPending);
                    if !self.wait_backoff().await {
                        return Ok(());
                    }
                    continue;
                }
            }

            self.transition(PumpState::Ready);
            match self.pump_events().await? {
                LoopExit::Shutdown => return Ok(()),
                LoopExit::Reconnect => {
                    if !self.wait_backoff().await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One connection attempt: resolve, open, handshake, start reading
    async fn connect(&mut self) -> GatewayResult<Attempt> {
        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            result = self.establish() => result.map(|()| Attempt::Connected),
            () = shutdown_signal(&mut shutdown) => Ok(Attempt::Interrupted),
        }
    }

    async fn establish(&mut self) -> GatewayResult<()> {
        // The cached endpoint is only stored back on success, so an attempt
        // that fails on it makes the next one resolve afresh
        let cached = self.endpoint.take().filter(|_| self.session.is_resumable());
        let endpoint = match cached {
            Some(endpoint) => {
                tracing::debug!(endpoint = %endpoint, "Reusing endpoint for resume");
                endpoint
            }
            None => self.resolver.resolve().await?,
        };

        let id = self.next_id;
        self.next_id = id.next();
        tracing::info!(connection = %id, endpoint = %endpoint, "Connecting to gateway");

        let mut handle =
            transport::connect(&endpoint.connect_url(), self.config.connect_timeout, id).await?;
        let outcome = self.negotiator.negotiate(&mut handle, &self.session).await?;

        if outcome.kind == HandshakeKind::Identify {
            self.session.clear();
        }
        handle.start_reader(self.control_tx.clone())?;

        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.update(id, outcome.heartbeat_interval);
        }
        self.awaiting_ack = false;
        self.current = Some(id);
        self.connection = Some(handle);
        self.endpoint = Some(endpoint);

        tracing::info!(
            connection = %id,
            kind = ?outcome.kind,
            heartbeat_secs = outcome.heartbeat_interval.as_secs(),
            "Gateway connection established"
        );
        Ok(())
    }

    /// Process control messages until the connection must be replaced
    async fn pump_events(&mut self) -> GatewayResult<LoopExit> {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            let message = tokio::select! {
                biased;
                () = shutdown_signal(&mut shutdown) => ControlMessage::Shutdown,
                message = self.control_rx.recv() => message.unwrap_or(ControlMessage::Shutdown),
            };

            if let Some(exit) = self.process(message).await? {
                return Ok(exit);
            }
        }
    }

    /// Handle one control message
    async fn process(&mut self, message: ControlMessage) -> GatewayResult<Option<LoopExit>> {
        if let Some(connection) = message.connection() {
            if self.current != Some(connection) {
                tracing::trace!(
                    connection = %connection,
                    kind = message.name(),
                    "Dropping message from replaced connection"
                );
                return Ok(None);
            }
        }

        match message {
            ControlMessage::Inbound { message, .. } => self.handle_inbound(message).await,
            ControlMessage::HeartbeatDue { .. } => {
                if self.config.require_heartbeat_ack && self.awaiting_ack {
                    return Ok(Some(self.begin_reconnect(&GatewayError::Zombied).await));
                }
                Ok(self.send_heartbeat().await)
            }
            ControlMessage::TransportError { error, .. } => {
                if error.is_fatal() {
                    self.close_connection().await;
                    return Err(error);
                }
                Ok(Some(self.begin_reconnect(&error).await))
            }
            ControlMessage::ReconnectNow => {
                tracing::info!("Reconnect requested");
                Ok(Some(self.reconnect_keeping_session().await))
            }
            ControlMessage::Shutdown => Ok(Some(LoopExit::Shutdown)),
        }
    }

    async fn handle_inbound(&mut self, message: GatewayMessage) -> GatewayResult<Option<LoopExit>> {
        match message.op {
            OpCode::Dispatch => {
                self.handle_dispatch(message);
                Ok(None)
            }
            OpCode::Heartbeat => {
                tracing::debug!("Server requested a heartbeat");
                Ok(self.send_heartbeat().await)
            }
            OpCode::HeartbeatAck => {
                tracing::trace!("Heartbeat acknowledged");
                self.awaiting_ack = false;
                Ok(None)
            }
            OpCode::Reconnect => {
                tracing::info!("Server asked to reconnect");
                Ok(Some(self.reconnect_keeping_session().await))
            }
            OpCode::InvalidSession => {
                tracing::warn!(
                    session_id = ?self.session.session_id(),
                    resumable = ?message.as_invalid_session(),
                    "Session invalidated, identifying on next connect"
                );
                self.session.clear();
                Ok(Some(self.reconnect_keeping_session().await))
            }
            OpCode::Hello | OpCode::Identify | OpCode::Resume => {
                tracing::debug!(op = %message.op, "Ignoring unexpected opcode");
                Ok(None)
            }
        }
    }

    fn handle_dispatch(&mut self, message: GatewayMessage) {
        if let Some(sequence) = message.s {
            self.session.observe_sequence(sequence);
        }

        if let Some(ready) = message.as_ready() {
            tracing::info!(session_id = %ready.session_id, version = ?ready.v, "Session ready");
            self.session.begin(ready.session_id);
            self.backoff.reset();
        } else if message.is_dispatch_of(GatewayMessage::RESUMED) {
            tracing::info!(seq = self.session.sequence(), "Session resumed");
            self.backoff.reset();
        }

        let Some(event) = DispatchEvent::from_message(message) else {
            return;
        };
        if event.is_authored_by(self.credentials.self_id()) {
            tracing::trace!(event_type = %event.event_type, "Suppressing self-authored event");
            return;
        }

        tracing::debug!(event_type = %event.event_type, seq = ?event.sequence, "Dispatching event");
        if let Some(dispatcher) = &self.dispatcher {
            if !dispatcher.submit(event) {
                tracing::warn!("Dispatcher stopped, event dropped");
            }
        }
    }

    /// Send a heartbeat; a failed send replaces the connection
    async fn send_heartbeat(&mut self) -> Option<LoopExit> {
        let heartbeat = GatewayMessage::heartbeat(self.session.last_sequence());
        let sent = match &self.connection {
            Some(handle) => handle.send(&heartbeat).await,
            None => Err(GatewayError::Send("no open connection".to_string())),
        };

        match sent {
            Ok(()) => {
                tracing::trace!(seq = ?self.session.last_sequence(), "Heartbeat sent");
                self.awaiting_ack = self.config.require_heartbeat_ack;
                None
            }
            Err(e) => Some(self.begin_reconnect(&e).await),
        }
    }

    async fn reconnect_keeping_session(&mut self) -> LoopExit {
        self.transition(PumpState::ReconnectPending);
        self.close_connection().await;
        LoopExit::Reconnect
    }

    /// Tear down the current connection after a failure
    async fn begin_reconnect(&mut self, reason: &GatewayError) -> LoopExit {
        if reason.is_timeout() {
            tracing::info!(error = %reason, "Gateway went quiet, reconnecting");
        } else {
            tracing::warn!(error = %reason, "Gateway connection lost, reconnecting");
        }
        if reason.invalidates_session() {
            self.session.clear();
        }
        self.reconnect_keeping_session().await
    }

    async fn close_connection(&mut self) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.suspend();
        }
        self.current = None;
        self.awaiting_ack = false;
        if let Some(mut handle) = self.connection.take() {
            handle.close().await;
        }
    }

    /// Sleep out the backoff, then clear the queue
    ///
    /// Returns `false` if shutdown was requested meanwhile.
    async fn wait_backoff(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.backoff.attempt(),
            resumable = self.session.is_resumable(),
            "Waiting before reconnecting"
        );

        let mut shutdown = self.shutdown.subscribe();
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => break,
                () = shutdown_signal(&mut shutdown) => return false,
                message = self.control_rx.recv() => match message {
                    Some(ControlMessage::Shutdown) | None => return false,
                    Some(other) => {
                        tracing::trace!(kind = other.name(), "Discarding message while disconnected");
                    }
                },
            }
        }

        self.purge_stale()
    }

    /// Drop everything queued except a shutdown request
    ///
    /// Returns `false` if a shutdown request was found.
    fn purge_stale(&mut self) -> bool {
        let mut discarded = 0_usize;
        while let Ok(message) = self.control_rx.try_recv() {
            if matches!(message, ControlMessage::Shutdown) {
                return false;
            }
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(discarded, "Purged stale control messages");
        }
        true
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Close the connection, then stop the timer and the dispatcher
    async fn shutdown(&mut self) {
        self.transition(PumpState::ShuttingDown);
        self.close_connection().await;

        if let Some(mut heartbeat) = self.heartbeat.take() {
            heartbeat.stop().await;
        }
        if let Some(mut dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown(self.config.shutdown_grace).await;
        }
        tracing::info!(
            session_id = ?self.session.session_id(),
            seq = self.session.sequence(),
            "Event pump stopped"
        );
    }

    fn transition(&mut self, next: PumpState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "Pump state change");
            self.state = next;
        }
    }
}

impl std::fmt::Debug for EventPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPump")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("current", &self.current)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Resolves once shutdown has been requested
async fn shutdown_signal(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|requested| *requested).await;
}
