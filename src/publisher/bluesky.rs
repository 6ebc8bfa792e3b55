//! Bluesky publisher built on `bsky-sdk`
//!
//! Each run gets a fresh [`BskyAgent`]:
//!
//! 1. `login` (handle + app password)
//! 2. `com.atproto.repo.uploadBlob` (image bytes)
//! 3. `create_record` (an `app.bsky.feed.post` with an `app.bsky.embed.images`
//!    embed referencing the blob)

use async_trait::async_trait;
use bsky_sdk::agent::config::Config as AgentConfig;
use bsky_sdk::api::app::bsky::embed::images;
use bsky_sdk::api::app::bsky::feed::post::{RecordData, RecordEmbedRefs};
use bsky_sdk::api::types::string::Datetime;
use bsky_sdk::api::types::{BlobRef, Union};
use bsky_sdk::api::xrpc::error::{Error as XrpcError, XrpcErrorKind};
use bsky_sdk::BskyAgent;
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use super::{PostId, PublishError, PublishResult, PublishSession, Publisher, PublishStage};
use crate::config::BlueskyConfig;
use crate::crawler::ImagePayload;
use crate::utils::truncate_text;

/// Bluesky post length limit (characters)
pub const MAX_POST_CHARS: usize = 300;

static HTTP_STATUS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b([45]\d\d)\b").unwrap());
// CamelCase XRPC error names such as `InvalidRequest` or `ExpiredToken`
static XRPC_ERROR_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][a-z]+(?:[A-Z][a-z]+)+)\b").unwrap());

/// Publishes to a Bluesky account
pub struct BlueskyPublisher {
    service_url: String,
    handle: Option<String>,
    app_password: Option<String>,
    timeout: Duration,
}

impl BlueskyPublisher {
    /// Create a publisher from the account settings
    ///
    /// Missing credentials are reported when a session is opened, so a
    /// publisher can exist in preview-only deployments.
    pub fn new(config: &BlueskyConfig) -> PublishResult<Self> {
        let service_url = config.service_url.trim_end_matches('/').to_string();
        url::Url::parse(&service_url).map_err(|e| PublishError::NotConfigured(format!(
            "invalid Bluesky service URL '{service_url}': {e}"
        )))?;

        Ok(Self {
            service_url,
            handle: config.handle.clone().filter(|h| !h.trim().is_empty()),
            app_password: config.app_password.clone().filter(|p| !p.is_empty()),
            timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// Whether credentials are present
    pub fn is_configured(&self) -> bool {
        self.handle.is_some() && self.app_password.is_some()
    }
}

/// Bound `call` by `timeout`, reporting expiry as a transport failure
async fn within<T>(
    stage: PublishStage,
    timeout: Duration,
    call: impl Future<Output = PublishResult<T>>,
) -> PublishResult<T> {
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or_else(|_| {
            Err(PublishError::Transport {
                stage,
                message: format!("no answer within {}s", timeout.as_secs()),
            })
        })
}

/// Classify a typed XRPC failure
fn xrpc_failure<E>(stage: PublishStage, err: XrpcError<E>) -> PublishError
where
    E: fmt::Debug + fmt::Display,
{
    match err {
        XrpcError::XrpcResponse(response) => {
            let status = response.status.as_u16();
            let (name, message) = match response.error {
                Some(XrpcErrorKind::Undefined(body)) => {
                    let message = match (&body.error, &body.message) {
                        (Some(error), Some(message)) => format!("{error}: {message}"),
                        (Some(error), None) => error.clone(),
                        (None, Some(message)) => message.clone(),
                        (None, None) => format!("HTTP {status}"),
                    };
                    (body.error, message)
                }
                Some(XrpcErrorKind::Custom(custom)) => {
                    let message = custom.to_string();
                    let name = message.split(':').next().map(|n| n.trim().to_string());
                    (name, message)
                }
                None => (None, format!("HTTP {status}")),
            };
            PublishError::from_status(stage, status, name.as_deref(), message)
        }
        XrpcError::HttpRequest(e) => PublishError::Transport {
            stage,
            message: e.to_string(),
        },
        XrpcError::HttpClient(e) => PublishError::Transport {
            stage,
            message: e.to_string(),
        },
        other => PublishError::MalformedResponse {
            stage,
            message: other.to_string(),
        },
    }
}

/// Classify an SDK failure known only by its rendered message
fn sdk_failure(stage: PublishStage, err: impl fmt::Display + fmt::Debug) -> PublishError {
    let message = err.to_string();
    let debug = format!("{err:?}");

    if message.contains("not logged in") || debug.contains("NotLoggedIn") {
        return PublishError::Authentication { stage, message };
    }
    if debug.contains("HttpClient") || debug.contains("HttpRequest") {
        return PublishError::Transport { stage, message };
    }

    let status = HTTP_STATUS
        .captures(&message)
        .and_then(|c| c[1].parse::<u16>().ok());
    let name = XRPC_ERROR_NAME
        .captures(&message)
        .map(|c| c[1].to_string());

    match status {
        Some(status) => PublishError::from_status(stage, status, name.as_deref(), message),
        None => PublishError::MalformedResponse { stage, message },
    }
}

#[async_trait]
impl Publisher for BlueskyPublisher {
    fn name(&self) -> &str {
        "bluesky"
    }

    async fn open_session(&self) -> PublishResult<Box<dyn PublishSession>> {
        let (Some(handle), Some(password)) = (&self.handle, &self.app_password) else {
            return Err(PublishError::NotConfigured(
                "Bluesky handle and app password are required".to_string(),
            ));
        };

        tracing::debug!(handle = %handle, service = %self.service_url, "Creating Bluesky session");

        let agent = BskyAgent::builder()
            .config(AgentConfig {
                endpoint: self.service_url.clone(),
                ..Default::default()
            })
            .build()
            .await
            .map_err(|e| PublishError::Transport {
                stage: PublishStage::Session,
                message: e.to_string(),
            })?;

        let session = within(PublishStage::Session, self.timeout, async {
            agent
                .login(handle, password)
                .await
                .map_err(|e| xrpc_failure(PublishStage::Session, e))
        })
        .await?;

        tracing::info!(did = %session.data.did.as_str(), "Bluesky session created");

        Ok(Box::new(BlueskySession {
            agent,
            timeout: self.timeout,
        }))
    }
}

/// Authenticated Bluesky session
struct BlueskySession {
    agent: BskyAgent,
    timeout: Duration,
}

impl BlueskySession {
    async fn upload_blob(&self, image: &ImagePayload) -> PublishResult<BlobRef> {
        let output = within(PublishStage::Upload, self.timeout, async {
            self.agent
                .api
                .com
                .atproto
                .repo
                .upload_blob(image.bytes.to_vec())
                .await
                .map_err(|e| xrpc_failure(PublishStage::Upload, e))
        })
        .await?;

        tracing::debug!(size = image.len(), content_type = %image.content_type, "Image blob uploaded");
        Ok(output.data.blob)
    }

    async fn create_post(&self, text: &str, blob: BlobRef, alt: &str) -> PublishResult<PostId> {
        let embed = images::MainData {
            images: vec![images::ImageData {
                alt: alt.to_string(),
                aspect_ratio: None,
                image: blob,
            }
            .into()],
        };

        let record = RecordData {
            created_at: Datetime::now(),
            embed: Some(Union::Refs(RecordEmbedRefs::AppBskyEmbedImagesMain(Box::new(
                embed.into(),
            )))),
            entities: None,
            facets: None,
            labels: None,
            langs: None,
            reply: None,
            tags: None,
            text: truncate_text(text, MAX_POST_CHARS),
        };

        let output = within(PublishStage::Post, self.timeout, async {
            self.agent
                .create_record(record)
                .await
                .map_err(|e| sdk_failure(PublishStage::Post, e))
        })
        .await?;

        Ok(PostId::new(output.data.uri))
    }
}

#[async_trait]
impl PublishSession for BlueskySession {
    async fn publish(&self, text: &str, image: &ImagePayload, alt: &str) -> PublishResult<PostId> {
        let blob = self.upload_blob(image).await?;
        let post_id = self.create_post(text, blob, alt).await?;
        tracing::info!(post_id = %post_id, "Posted to Bluesky");
        Ok(post_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_service_url_and_detects_credentials() {
        let config = BlueskyConfig {
            service_url: "https://pds.example/".to_string(),
            handle: Some("bot.example".to_string()),
            app_password: None,
            ..BlueskyConfig::default()
        };
        let publisher = BlueskyPublisher::new(&config).unwrap();
        assert_eq!(publisher.service_url, "https://pds.example");
        assert!(!publisher.is_configured());
        assert_eq!(publisher.name(), "bluesky");
    }

    #[test]
    fn test_new_rejects_malformed_service_url() {
        let config = BlueskyConfig {
            service_url: "not a url".to_string(),
            ..BlueskyConfig::default()
        };
        let err = BlueskyPublisher::new(&config).err().unwrap();
        assert!(matches!(err, PublishError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_open_session_without_credentials() {
        let publisher = BlueskyPublisher::new(&BlueskyConfig::default()).unwrap();
        let err = publisher.open_session().await.err().unwrap();
        assert!(matches!(err, PublishError::NotConfigured(_)));
    }

    #[test]
    fn test_sdk_failure_uses_status_and_error_name() {
        let err = sdk_failure(
            PublishStage::Post,
            "xrpc response error: 400 InvalidRequest: Record/text must not be longer than 300 graphemes",
        );
        assert!(matches!(err, PublishError::Rejected { stage: PublishStage::Post, .. }));

        let err = sdk_failure(PublishStage::Post, "xrpc response error: 400 ExpiredToken: Token has expired");
        assert!(matches!(err, PublishError::Authentication { .. }));

        let err = sdk_failure(PublishStage::Post, "xrpc response error: 503 Service Unavailable");
        assert!(matches!(err, PublishError::Server { status: 503, .. }));
    }

    #[test]
    fn test_sdk_failure_without_status() {
        let err = sdk_failure(PublishStage::Post, "not logged in");
        assert!(matches!(err, PublishError::Authentication { .. }));

        let err = sdk_failure(PublishStage::Post, "unexpected response type");
        assert!(matches!(err, PublishError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_within_reports_timeout_as_transport() {
        let result: PublishResult<()> = within(PublishStage::Upload, Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, PublishError::Transport { stage: PublishStage::Upload, .. }));
    }
}
