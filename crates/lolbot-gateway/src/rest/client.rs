//! HTTP API client

use super::RestError;
use crate::backoff::{retry_with_backoff, RetryPolicy};
use crate::dispatch::Replier;
use async_trait::async_trait;
use lolbot_core::{Credentials, Snowflake};
use serde::Serialize;
use std::time::Duration;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
}

/// Authenticated client for the chat platform's REST API
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    authorization: String,
    retry: RetryPolicy,
}

impl RestClient {
    pub fn new(
        base_url: &str,
        credentials: &Credentials,
        retry: RetryPolicy,
    ) -> Result<Self, RestError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("lolbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RestError::Setup(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: format!("Bot {}", credentials.token()),
            retry,
        })
    }

    /// The underlying HTTP client, shared with endpoint discovery
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /channels/{channel_id}/messages`
    pub async fn create_message(&self, channel_id: Snowflake, content: &str) -> Result<(), RestError> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);

        retry_with_backoff(self.retry, "create_message", RestError::is_transient, || async {
            let response = self
                .http
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, &self.authorization)
                .json(&CreateMessage { content })
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                tracing::debug!(channel_id = %channel_id, "Message sent");
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            Err(RestError::Status { status, body })
        })
        .await
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish()
    }
}

#[async_trait]
impl Replier for RestClient {
    async fn reply(&self, channel_id: Snowflake, content: &str) -> Result<(), RestError> {
        self.create_message(channel_id, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lolbot_core::ShardInfo;

    fn credentials() -> Credentials {
        Credentials::new("secret-token", Snowflake::new(1), ShardInfo::SINGLE).unwrap()
    }

    #[test]
    fn test_new_trims_base_url() {
        let client = RestClient::new("https://discord.com/api/", &credentials(), RetryPolicy::new(0)).unwrap();
        assert_eq!(client.base_url(), "https://discord.com/api");
        assert_eq!(client.authorization, "Bot secret-token");
    }

    #[test]
    fn test_debug_hides_token() {
        let client = RestClient::new("https://discord.com/api", &credentials(), RetryPolicy::new(0)).unwrap();
        assert!(!format!("{client:?}").contains("secret-token"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let client = RestClient::new("http://127.0.0.1:1", &credentials(), RetryPolicy::new(0)).unwrap();
        let err = client.create_message(Snowflake::new(5), "hi").await.unwrap_err();
        assert!(matches!(err, RestError::Request(_)));
    }
}
