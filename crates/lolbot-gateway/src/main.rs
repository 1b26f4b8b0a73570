//! lolbot entry point
//!
//! Run with:
//! ```bash
//! cargo run -p lolbot-gateway --bin lolbot
//! ```
//!
//! Configuration is loaded from environment variables (and `.env`).

use lolbot_common::{try_init_tracing, try_init_tracing_with_config, AppConfig, AppError, TracingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, exit_code = e.exit_code(), "lolbot stopped");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<(), AppError> {
    // Load configuration
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Tracing is not set up from settings yet, fall back to defaults
            if let Err(te) = try_init_tracing() {
                eprintln!("Warning: Failed to initialize tracing: {te}");
            }
            error!(error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };

    // Initialize tracing
    if let Err(e) = try_init_tracing_with_config(&TracingConfig::from_settings(&config.app)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        env = ?config.app.env,
        shard = config.bot.shard_index,
        shard_count = config.bot.shard_count,
        "Configuration loaded"
    );

    lolbot_gateway::run(config).await?;

    info!("lolbot stopped cleanly");
    Ok(())
}
