//! Endpoint resolvers

use super::GatewayEndpoint;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Source of the gateway socket URL
///
/// Called once per fresh connection attempt. Implementations do not retry;
/// the caller owns the backoff.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    async fn resolve(&self) -> GatewayResult<GatewayEndpoint>;
}

/// Response body of `GET {api}/gateway`
#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    #[serde(default)]
    url: Option<String>,
}

/// Resolves the URL through the REST discovery endpoint
#[derive(Debug, Clone)]
pub struct HttpEndpointResolver {
    client: reqwest::Client,
    discovery_url: String,
    version: String,
}

impl HttpEndpointResolver {
    /// Create a resolver for `{api_base_url}/gateway`
    pub fn new(
        api_base_url: &str,
        version: impl Into<String>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("HTTP client: {e}")))?;

        Ok(Self::with_client(client, api_base_url, version))
    }

    /// Create a resolver sharing an existing HTTP client
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        api_base_url: &str,
        version: impl Into<String>,
    ) -> Self {
        Self {
            client,
            discovery_url: format!("{}/gateway", api_base_url.trim_end_matches('/')),
            version: version.into(),
        }
    }

    #[must_use]
    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }
}

#[async_trait]
impl EndpointResolver for HttpEndpointResolver {
    async fn resolve(&self) -> GatewayResult<GatewayEndpoint> {
        tracing::debug!(url = %self.discovery_url, "Resolving gateway endpoint");

        let response = self
            .client
            .get(&self.discovery_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| GatewayError::Discovery(e.to_string()))?;

        let body: DiscoveryResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Discovery(e.to_string()))?;

        match body.url {
            Some(url) if !url.trim().is_empty() => Ok(GatewayEndpoint::new(url, self.version.clone())),
            _ => Err(GatewayError::Discovery(
                "response carried no usable url".to_string(),
            )),
        }
    }
}

/// Always resolves to a fixed URL
#[derive(Debug, Clone)]
pub struct StaticEndpointResolver {
    endpoint: GatewayEndpoint,
}

impl StaticEndpointResolver {
    #[must_use]
    pub fn new(url: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            endpoint: GatewayEndpoint::new(url, version),
        }
    }
}

#[async_trait]
impl EndpointResolver for StaticEndpointResolver {
    async fn resolve(&self) -> GatewayResult<GatewayEndpoint> {
        Ok(self.endpoint.clone())
    }
}
