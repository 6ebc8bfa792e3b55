//! Outbound wiki traffic with rate limiting
//!
//! Everything that talks to the wiki (the category API, article pages and
//! image downloads) goes through one [`WikiClient`], so a single governor
//! quota covers all of it.

pub mod category;
pub mod fetcher;

pub use category::{CategoryLister, Denylist, WikiCategoryLister};
pub use fetcher::{HttpImageFetcher, ImageFetcher, ImagePayload};

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::config::WikiConfig;
use crate::utils::error::FetchError;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared HTTP client for wiki requests
///
/// Cloning is cheap; clones share the connection pool and the rate limiter.
#[derive(Clone)]
pub struct WikiClient {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: Arc<DirectRateLimiter>,
}

impl WikiClient {
    /// Create a client from the wiki settings
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &WikiConfig) -> Result<Self, FetchError> {
        Self::with_settings(
            &config.user_agent,
            Duration::from_secs(config.request_timeout_secs),
            config.requests_per_second,
        )
    }

    /// Create a client with explicit settings
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn with_settings(
        user_agent: &str,
        timeout: Duration,
        requests_per_second: u32,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(rate)));

        Ok(Self {
            client,
            rate_limiter,
        })
    }

    /// GET `url` with optional query parameters
    ///
    /// Waits for the rate limiter, then fails with `FetchError::Status` on a
    /// non-success response.
    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response, FetchError> {
        self.rate_limiter.until_ready().await;

        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_request(url, e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %response.url(), status = status.as_u16(), "Non-success response");
            return Err(FetchError::Status {
                url: response.url().to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    /// GET a page and return its body as text
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url, &[]).await?;
        response
            .text()
            .await
            .map_err(|e| FetchError::from_request(url, e))
    }

    /// GET a JSON document
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Decode` if the body is not the expected shape
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let response = self.get(url, query).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_request(url, e))?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }
}
