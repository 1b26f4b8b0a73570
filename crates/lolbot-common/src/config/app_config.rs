//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use lolbot_core::{Credentials, CredentialsError, ShardInfo, Snowflake};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub bot: BotConfig,
    pub gateway: GatewayConfig,
    pub dispatch: DispatchConfig,
    pub commands: CommandConfig,
    pub rest: RestConfig,
}

/// General application settings
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub name: String,
    pub env: Environment,
    pub log_level: String,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Bot identity
#[derive(Clone)]
pub struct BotConfig {
    pub token: String,
    pub self_id: Snowflake,
    pub shard_index: u32,
    pub shard_count: u32,
}

impl BotConfig {
    /// Build validated credentials
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let shard = ShardInfo::new(self.shard_index, self.shard_count)
            .map_err(|e| ConfigError::InvalidValue("SHARD_ID", e.to_string()))?;
        Credentials::new(self.token.clone(), self.self_id, shard).map_err(|e| match e {
            CredentialsError::EmptyToken => ConfigError::MissingVar("BOT_TOKEN"),
            other => ConfigError::InvalidValue("BOT_TOKEN", other.to_string()),
        })
    }
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("self_id", &self.self_id)
            .field("shard_index", &self.shard_index)
            .field("shard_count", &self.shard_count)
            .finish()
    }
}

/// Gateway connection parameters
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// REST base, discovery is `{api_base_url}/gateway`
    pub api_base_url: String,
    /// Protocol version appended to the socket URL
    pub version: String,
    /// Fixed socket URL, skips discovery when set
    pub url_override: Option<String>,
    pub connect_timeout_secs: u64,
    pub require_heartbeat_ack: bool,
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl GatewayConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    #[must_use]
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }
}

/// Downstream dispatch settings
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub max_concurrency: usize,
}

/// `!command` settings
#[derive(Debug, Clone)]
pub struct CommandConfig {
    pub prefix: String,
    /// Respond to commands sent by other bots
    pub respond_to_bots: bool,
    pub admins: Vec<Snowflake>,
}

/// REST client settings
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub max_retries: u32,
}

// Default value functions
fn default_app_name() -> String {
    "lolbot".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base_url() -> String {
    "https://discord.com/api".to_string()
}

fn default_gateway_version() -> String {
    "6".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_reconnect_initial_delay() -> u64 {
    1_000
}

fn default_reconnect_max_delay() -> u64 {
    60_000
}

fn default_dispatch_concurrency() -> usize {
    16
}

fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_rest_retries() -> u32 {
    2
}

/// Read an optional variable, treating empty values as unset
fn var(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Read and parse an optional variable, failing on unparsable values
fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        None => Ok(None),
    }
}

fn parse_bool(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match var(name) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue(name, raw)),
        },
        None => Ok(None),
    }
}

fn parse_id_list(name: &'static str) -> Result<Vec<Snowflake>, ConfigError> {
    var(name)
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| {
                    Snowflake::parse(part)
                        .map_err(|_| ConfigError::InvalidValue(name, part.to_string()))
                })
                .collect()
        })
        .unwrap_or_else(|| Ok(Vec::new()))
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or unparsable
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            app: AppSettings {
                name: var("APP_NAME").unwrap_or_else(default_app_name),
                env: var("APP_ENV")
                    .and_then(|s| Environment::parse(&s))
                    .unwrap_or_default(),
                log_level: var("LOG_LEVEL").unwrap_or_else(default_log_level),
            },
            bot: BotConfig {
                token: var("BOT_TOKEN").ok_or(ConfigError::MissingVar("BOT_TOKEN"))?,
                self_id: parse_var("BOT_SELF_ID")?.ok_or(ConfigError::MissingVar("BOT_SELF_ID"))?,
                shard_index: parse_var("SHARD_ID")?.unwrap_or(0),
                shard_count: parse_var("SHARD_COUNT")?.unwrap_or(1),
            },
            gateway: GatewayConfig {
                api_base_url: var("API_BASE_URL").unwrap_or_else(default_api_base_url),
                version: var("GATEWAY_VERSION").unwrap_or_else(default_gateway_version),
                url_override: var("GATEWAY_URL"),
                connect_timeout_secs: parse_var("GATEWAY_CONNECT_TIMEOUT_SECS")?
                    .unwrap_or_else(default_connect_timeout),
                require_heartbeat_ack: parse_bool("GATEWAY_REQUIRE_HEARTBEAT_ACK")?.unwrap_or(true),
                reconnect_initial_delay_ms: parse_var("RECONNECT_INITIAL_DELAY_MS")?
                    .unwrap_or_else(default_reconnect_initial_delay),
                reconnect_max_delay_ms: parse_var("RECONNECT_MAX_DELAY_MS")?
                    .unwrap_or_else(default_reconnect_max_delay),
            },
            dispatch: DispatchConfig {
                max_concurrency: parse_var("DISPATCH_MAX_CONCURRENCY")?
                    .unwrap_or_else(default_dispatch_concurrency),
            },
            commands: CommandConfig {
                prefix: var("COMMAND_PREFIX").unwrap_or_else(default_command_prefix),
                respond_to_bots: parse_bool("BOT_COMMANDS")?.unwrap_or(false),
                admins: parse_id_list("ADMINS")?,
            },
            rest: RestConfig {
                max_retries: parse_var("REST_MAX_RETRIES")?.unwrap_or_else(default_rest_retries),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bot.credentials()?;

        if self.gateway.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "GATEWAY_CONNECT_TIMEOUT_SECS",
                "must be greater than zero".to_string(),
            ));
        }
        if self.gateway.reconnect_initial_delay_ms > self.gateway.reconnect_max_delay_ms {
            return Err(ConfigError::InvalidValue(
                "RECONNECT_INITIAL_DELAY_MS",
                "must not exceed RECONNECT_MAX_DELAY_MS".to_string(),
            ));
        }
        if self.dispatch.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "DISPATCH_MAX_CONCURRENCY",
                "must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
