//! HTTP client for listing-page fetches
//!
//! Provides the [`PageFetcher`] capability that harvesting agents receive
//! at construction, backed by a shared `reqwest` client with request-rate
//! limiting and fixed-count retry. Sources never talk to the network
//! directly; they are handed this trait object and nothing else.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{http, limits};
use crate::errors::{SourceError, SourceResult};
use crate::retry::retry_fixed;

/// Capability for fetching one listing page as text
///
/// Injected into agents by construction so tests can substitute a scripted
/// fetcher for the real network client.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the page at `url` and return its body
    async fn fetch_page(&self, url: &str) -> SourceResult<String>;
}

/// Configuration for the shared page client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Rate limit across all sources (requests per second)
    pub rate_limit_rps: u32,
    /// Retry attempts per page fetch
    pub fetch_retries: usize,
    /// Fixed delay between retry attempts
    #[serde(with = "humantime_serde")]
    pub fetch_retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: http::DEFAULT_RATE_LIMIT_RPS,
            fetch_retries: limits::PAGE_FETCH_RETRIES,
            fetch_retry_delay: limits::PAGE_FETCH_RETRY_DELAY,
        }
    }
}

impl ClientConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.rate_limit_rps == 0 {
            return Err("rate_limit_rps must be greater than 0".to_string());
        }
        if self.fetch_retries == 0 {
            return Err("fetch_retries must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Build the underlying HTTP client
    fn build_http_client(&self) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .cookie_store(true)
            .build()
    }
}

/// Rate-limited page client shared by all harvesting agents
pub struct PageClient {
    client: Client,
    config: ClientConfig,
    rate_limiter: RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>,
}

impl PageClient {
    /// Create a new page client
    ///
    /// # Errors
    ///
    /// Returns `SourceError` if the HTTP client cannot be constructed or
    /// the rate limit is zero.
    pub fn new(config: ClientConfig) -> SourceResult<Self> {
        let quota_rps = NonZeroU32::new(config.rate_limit_rps).ok_or_else(|| {
            SourceError::InvalidUrl {
                url: "rate limit must be non-zero".to_string(),
            }
        })?;
        let rate_limiter = RateLimiter::direct(Quota::per_second(quota_rps));
        let client = config.build_http_client().map_err(SourceError::Http)?;

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for PageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageClient")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl PageFetcher for PageClient {
    async fn fetch_page(&self, url: &str) -> SourceResult<String> {
        let parsed = Url::parse(url).map_err(|_| SourceError::InvalidUrl {
            url: url.to_string(),
        })?;

        // Jittered rate limiting avoids a synchronized burst when several
        // agents tick at once.
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        retry_fixed(
            self.config.fetch_retries,
            self.config.fetch_retry_delay,
            |attempt, limit, err: &SourceError| {
                tracing::warn!(
                    "page fetch failed (attempt {}/{}): {}",
                    attempt,
                    limit,
                    err
                );
            },
            || {
                let client = self.client.clone();
                let url = parsed.clone();
                async move {
                    let response = client.get(url.as_str()).send().await?.error_for_status()?;
                    let body = response.text().await?;
                    tracing::debug!("fetched {} ({} bytes)", url, body.len());
                    Ok(body)
                }
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.rate_limit_rps, http::DEFAULT_RATE_LIMIT_RPS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_config_rejects_zero_rate() {
        let config = ClientConfig {
            rate_limit_rps: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_page_client_creation() {
        let client = PageClient::new(ClientConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_url() {
        let client = PageClient::new(ClientConfig::default()).unwrap();
        let result = client.fetch_page("not a url").await;
        assert!(matches!(result, Err(SourceError::InvalidUrl { .. })));
    }
}
