//! REST errors

use reqwest::StatusCode;

/// REST call failures
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// Could not build the client
    #[error("HTTP client setup failed: {0}")]
    Setup(String),

    /// Request never got a response
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with an error status
    #[error("Server returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl RestError {
    /// Whether retrying the same request may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Setup(_) => false,
            Self::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
        }
    }
}
