//! Handshake negotiator

use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{GatewayMessage, HelloPayload, IdentifyPayload, IdentifyProperties, OpCode, ResumePayload};
use crate::session::SessionState;
use crate::transport::ConnectionHandle;
use lolbot_core::Credentials;
use std::fmt;
use std::time::Duration;

/// Progress of one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    Connecting,
    AwaitingHello,
    Identifying,
    Resuming,
    /// Login sent, the server answers with READY or RESUMED
    Ready,
    Failed,
}

impl HandshakePhase {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which login frame was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeKind {
    Identify,
    Resume,
}

impl HandshakeKind {
    #[must_use]
    pub fn phase(&self) -> HandshakePhase {
        match self {
            Self::Identify => HandshakePhase::Identifying,
            Self::Resume => HandshakePhase::Resuming,
        }
    }
}

/// Result of a successful handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeOutcome {
    /// Negotiated heartbeat period, whole seconds
    pub heartbeat_interval: Duration,
    pub kind: HandshakeKind,
}

impl HandshakeOutcome {
    /// Read timeout that goes with the negotiated interval
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.heartbeat_interval * 2
    }
}

/// Validate the first server frame and extract the hello payload
pub fn parse_hello(message: &GatewayMessage) -> GatewayResult<HelloPayload> {
    if message.op != OpCode::Hello {
        return Err(GatewayError::Handshake(format!(
            "expected Hello, got {}",
            message.op
        )));
    }
    message
        .as_hello()
        .ok_or_else(|| GatewayError::Handshake("malformed Hello payload".to_string()))
}

/// Build the login frame for the current session
///
/// Resume only when a session id is stored, Identify otherwise.
#[must_use]
pub fn build_login(
    credentials: &Credentials,
    properties: &IdentifyProperties,
    session: &SessionState,
) -> (HandshakeKind, GatewayMessage) {
    match session.session_id() {
        Some(session_id) => {
            let payload = ResumePayload {
                token: credentials.token().to_string(),
                session_id: session_id.to_string(),
                seq: session.sequence(),
            };
            (HandshakeKind::Resume, GatewayMessage::resume(&payload))
        }
        None => {
            let payload =
                IdentifyPayload::new(credentials.token(), properties.clone(), credentials.shard());
            (HandshakeKind::Identify, GatewayMessage::identify(&payload))
        }
    }
}

/// Drives the opening exchange on a fresh connection
#[derive(Debug, Clone)]
pub struct HandshakeNegotiator {
    credentials: Credentials,
    properties: IdentifyProperties,
    hello_timeout: Duration,
}

impl HandshakeNegotiator {
    #[must_use]
    pub fn new(credentials: Credentials, hello_timeout: Duration) -> Self {
        Self {
            credentials,
            properties: IdentifyProperties::new(),
            hello_timeout,
        }
    }

    /// Override the client properties sent with Identify
    #[must_use]
    pub fn with_properties(mut self, properties: IdentifyProperties) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Run the handshake on `handle`
    ///
    /// On success the login frame is sent and the handle's read timeout is
    /// twice the negotiated heartbeat interval.
    pub async fn negotiate(
        &self,
        handle: &mut ConnectionHandle,
        session: &SessionState,
    ) -> GatewayResult<HandshakeOutcome> {
        let connection = handle.id();
        let mut phase = HandshakePhase::Connecting;

        let result = self.run(handle, session, &mut phase).await;
        if let Err(e) = &result {
            tracing::warn!(
                connection = %connection,
                phase = %phase,
                error = %e,
                "Handshake failed"
            );
        }
        result
    }

    async fn run(
        &self,
        handle: &mut ConnectionHandle,
        session: &SessionState,
        phase: &mut HandshakePhase,
    ) -> GatewayResult<HandshakeOutcome> {
        if !self.credentials.has_token() {
            *phase = HandshakePhase::Failed;
            return Err(GatewayError::Config("bot token is empty".to_string()));
        }

        *phase = HandshakePhase::AwaitingHello;
        let first = handle.receive(self.hello_timeout).await.map_err(|e| match e {
            GatewayError::Timeout(after) => {
                GatewayError::Handshake(format!("no Hello within {after:?}"))
            }
            GatewayError::Decode(e) => GatewayError::Handshake(format!("malformed first frame: {e}")),
            other => other,
        })?;
        let hello = parse_hello(&first)?;
        let heartbeat_interval = hello.heartbeat_period();

        let (kind, login) = build_login(&self.credentials, &self.properties, session);
        *phase = kind.phase();
        tracing::info!(
            connection = %handle.id(),
            kind = ?kind,
            heartbeat_secs = heartbeat_interval.as_secs(),
            "Hello received, logging in"
        );
        handle.send(&login).await?;

        let outcome = HandshakeOutcome {
            heartbeat_interval,
            kind,
        };
        handle.set_read_timeout(outcome.read_timeout());
        *phase = HandshakePhase::Ready;
        Ok(outcome)
    }
}
