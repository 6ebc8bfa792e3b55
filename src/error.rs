//! Crate-level error for wiring and construction
//!
//! Operations return their own domain errors (`FetchError`, `StoreError`,
//! `PublishError`, `RunError`). [`Error`] wraps the ones that can surface
//! while building the orchestrator from configuration.

use thiserror::Error;

pub use crate::publisher::PublishError;
pub use crate::utils::error::{FetchError, StoreError};

/// Error raised while assembling the application
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP client or URL setup
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Publisher setup
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Marker store setup
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid settings
    #[error("Config error: {0}")]
    Config(String),

    /// Error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias using the crate Error type
pub type Result<T> = std::result::Result<T, Error>;
