//! # lolbot-gateway
//!
//! Gateway connection manager for the bot: endpoint discovery, the socket
//! transport, the login handshake, heartbeating, session tracking and the
//! event pump that ties them together, plus the downstream dispatcher and
//! command registry.

pub mod backoff;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod handshake;
pub mod heartbeat;
pub mod protocol;
pub mod pump;
pub mod rest;
pub mod session;
pub mod transport;

pub use discovery::{
    EndpointResolver, GatewayEndpoint, HttpEndpointResolver, StaticEndpointResolver,
};
pub use dispatch::{
    Command, CommandContext, CommandHandler, DispatchEvent, EventHandler, EventRegistry,
    HandlerError, Replier,
};
pub use error::{GatewayError, GatewayResult};
pub use pump::{EventPump, PumpConfig, PumpHandle, PumpState};
pub use rest::{RestClient, RestError};
pub use session::SessionState;

use backoff::RetryPolicy;
use lolbot_common::{AppConfig, AppError, AppResult};
use std::sync::Arc;

/// Build the endpoint resolver the configuration asks for
pub fn build_resolver(config: &AppConfig, http: reqwest::Client) -> Arc<dyn EndpointResolver> {
    match &config.gateway.url_override {
        Some(url) => {
            tracing::info!(url = %url, "Using fixed gateway URL, discovery disabled");
            Arc::new(StaticEndpointResolver::new(url.clone(), config.gateway.version.clone()))
        }
        None => Arc::new(HttpEndpointResolver::with_client(
            http,
            &config.gateway.api_base_url,
            config.gateway.version.clone(),
        )),
    }
}

/// Run the bot until Ctrl-C or a fatal gateway error
pub async fn run(config: AppConfig) -> AppResult<()> {
    let credentials = config.bot.credentials()?;

    let rest = RestClient::new(
        &config.gateway.api_base_url,
        &credentials,
        RetryPolicy::new(config.rest.max_retries),
    )
    .map_err(|e| AppError::Startup(e.to_string()))?;
    let resolver = build_resolver(&config, rest.http().clone());

    let registry = EventRegistry::new(&config.commands, Arc::new(rest)).with_builtins();
    let pump = EventPump::new(
        PumpConfig::from_app(&config),
        credentials,
        resolver,
        Arc::new(registry),
    );

    let handle = pump.handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                handle.shutdown();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    pump.run().await?;
    Ok(())
}
