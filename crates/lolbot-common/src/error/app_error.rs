//! Application error types
//!
//! The errors that end the process. Everything transient is recovered inside
//! the gateway and never reaches this type.

use crate::config::ConfigError;
use crate::telemetry::TracingError;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration found unusable after startup (e.g. the server refused the token)
    #[error("Configuration error: {0}")]
    Misconfigured(String),

    // Startup errors
    #[error(transparent)]
    Tracing(#[from] TracingError),

    #[error("Startup failed: {0}")]
    Startup(String),

    // Internal errors
    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Misconfigured(_) => 78,
            Self::Tracing(_) | Self::Startup(_) | Self::Internal(_) => 1,
        }
    }

    /// Whether the operator must change configuration before retrying
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Misconfigured(_))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

/// Result type alias using `AppError`
pub type AppResult<T> = Result<T, AppError>;
