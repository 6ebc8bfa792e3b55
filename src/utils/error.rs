//! Error types for the upstream fetchers and the marker store
//!
//! Publisher errors live next to the publisher in [`crate::publisher`].

use thiserror::Error;

/// Errors that can occur while talking to the wiki (category API, article
/// pages, image downloads)
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request timeout
    #[error("Request timeout: {url}")]
    Timeout { url: String },

    /// Non-success HTTP status
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Body could not be decoded into the expected shape
    #[error("Decoding error: {0}")]
    Decode(String),
}

impl FetchError {
    /// Build from a reqwest error, keeping timeouts distinguishable
    pub fn from_request(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Http(err)
        }
    }

    /// HTTP status code, when the failure was a status failure
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors from the key-value store holding the gate marker
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend unreachable or pool exhausted
    #[error("Store connection failed: {0}")]
    Connection(String),

    /// Backend rejected a command
    #[error("Store command failed: {0}")]
    Command(#[from] redis::RedisError),

    /// Local file I/O failure
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be decoded
    #[error("Store data corrupt: {0}")]
    Corrupt(String),
}
