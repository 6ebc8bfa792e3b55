//! Social network publishing
//!
//! A [`Publisher`] opens a [`PublishSession`] for one run; the session
//! uploads the image and creates the post referencing it. Sessions are not
//! cached between runs.

pub mod bluesky;

pub use bluesky::BlueskyPublisher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crawler::ImagePayload;

/// Result type for publisher operations
pub type PublishResult<T> = Result<T, PublishError>;

/// Identifier of a created post
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Step of the publish sequence that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStage {
    /// Creating the authenticated session
    Session,
    /// Uploading the image
    Upload,
    /// Creating the post record
    Post,
}

impl PublishStage {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Upload => "upload",
            Self::Post => "post",
        }
    }
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Credentials rejected or token invalid
    #[error("Authentication failed during {stage}: {message}")]
    Authentication { stage: PublishStage, message: String },

    /// Request refused as invalid
    #[error("Request rejected during {stage}: {message}")]
    Rejected { stage: PublishStage, message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded during {stage}: {message}")]
    RateLimited { stage: PublishStage, message: String },

    /// Server-side failure
    #[error("Server error {status} during {stage}: {message}")]
    Server {
        stage: PublishStage,
        status: u16,
        message: String,
    },

    /// Connection failure or timeout
    #[error("Transport failure during {stage}: {message}")]
    Transport { stage: PublishStage, message: String },

    /// Response body did not have the expected shape
    #[error("Malformed response during {stage}: {message}")]
    MalformedResponse { stage: PublishStage, message: String },

    /// Account settings missing
    #[error("Publisher not configured: {0}")]
    NotConfigured(String),
}

impl PublishError {
    /// Stage the failure happened in
    pub fn stage(&self) -> Option<PublishStage> {
        match self {
            Self::Authentication { stage, .. }
            | Self::Rejected { stage, .. }
            | Self::RateLimited { stage, .. }
            | Self::Server { stage, .. }
            | Self::Transport { stage, .. }
            | Self::MalformedResponse { stage, .. } => Some(*stage),
            Self::NotConfigured(_) => None,
        }
    }

    /// Classify a non-success HTTP response
    ///
    /// `error` is the XRPC error name from the body, when present.
    pub fn from_status(stage: PublishStage, status: u16, error: Option<&str>, message: String) -> Self {
        const AUTH_ERRORS: &[&str] = &[
            "AuthenticationRequired",
            "InvalidToken",
            "ExpiredToken",
            "AccountTakedown",
            "AuthFactorTokenRequired",
        ];

        let error = error.unwrap_or_default();
        if status == 401 || status == 403 || AUTH_ERRORS.contains(&error) {
            Self::Authentication { stage, message }
        } else if status == 429 || error == "RateLimitExceeded" {
            Self::RateLimited { stage, message }
        } else if status >= 500 {
            Self::Server {
                stage,
                status,
                message,
            }
        } else {
            Self::Rejected { stage, message }
        }
    }
}

/// A social network account that can be posted to
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Get the publisher name
    fn name(&self) -> &str;

    /// Authenticate and return a session valid for this run
    async fn open_session(&self) -> PublishResult<Box<dyn PublishSession>>;
}

/// An authenticated session
#[async_trait]
pub trait PublishSession: Send + Sync {
    /// Upload `image` and create a post with `text`, using `alt` as the image
    /// description
    async fn publish(&self, text: &str, image: &ImagePayload, alt: &str) -> PublishResult<PostId>;
}
