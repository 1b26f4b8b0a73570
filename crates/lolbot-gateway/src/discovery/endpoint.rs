//! Resolved gateway endpoint

use std::fmt;

/// Socket base URL plus the protocol version to request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEndpoint {
    base_url: String,
    version: String,
}

impl GatewayEndpoint {
    #[must_use]
    pub fn new(base_url: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            version: version.into(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// URL to open the socket on, with version and encoding in the query
    #[must_use]
    pub fn connect_url(&self) -> String {
        let separator = if self.base_url.ends_with('/') { "" } else { "/" };
        format!(
            "{}{}?v={}&encoding=json",
            self.base_url, separator, self.version
        )
    }
}

impl fmt::Display for GatewayEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.connect_url())
    }
}
