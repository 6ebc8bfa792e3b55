//! Image download

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;

use crate::crawler::WikiClient;
use crate::utils::error::FetchError;

/// Content type used when the server does not send one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Downloaded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Raw image bytes
    pub bytes: Bytes,
    /// MIME type as reported by the server
    pub content_type: String,
}

impl ImagePayload {
    /// Size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the body was empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Downloads image bytes
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Download `url` fully into memory
    async fn fetch_image(&self, url: &str) -> Result<ImagePayload, FetchError>;
}

/// Image fetcher over the shared wiki client
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: WikiClient,
}

impl HttpImageFetcher {
    /// Create a fetcher sharing `client`'s rate limiter
    pub fn new(client: WikiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_image(&self, url: &str) -> Result<ImagePayload, FetchError> {
        let response = self.client.get(url, &[]).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_request(url, e))?;

        tracing::debug!(url, content_type = %content_type, size = bytes.len(), "Image downloaded");

        Ok(ImagePayload {
            bytes,
            content_type,
        })
    }
}
