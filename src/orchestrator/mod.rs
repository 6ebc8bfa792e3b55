//! Post orchestration
//!
//! One run walks a fixed sequence of states:
//!
//! ```text
//! GateCheck -> Selecting -> FetchingImage -> Publishing -> Recording -> Done
//!     |            |              |               |
//!     v            v              v               v
//! Suppressed   Exhausted       Failed          Failed
//! ```
//!
//! The gate is consulted before anything touches the network and written
//! only after a post was created. Nothing is retried except the selection
//! loop, which draws up to `max_attempts` titles (with replacement) until
//! one has a timeline image.
//!
//! # Example
//!
//! ```rust,ignore
//! let orchestrator = PostOrchestrator::builder()
//!     .lister(lister)
//!     .locator(locator)
//!     .fetcher(fetcher)
//!     .publisher(publisher)
//!     .gate(gate)
//!     .build()?;
//!
//! match orchestrator.run().await? {
//!     RunOutcome::Posted(receipt) => println!("posted {}", receipt.post_id),
//!     RunOutcome::Suppressed => println!("already posted"),
//! }
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::crawler::{CategoryLister, ImageFetcher, ImagePayload};
use crate::gate::{GateStatus, PostGate};
use crate::metrics;
use crate::parser::{ImageLocator, TimelineImage};
use crate::publisher::bluesky::MAX_POST_CHARS;
use crate::publisher::{PostId, PublishError, PublishResult, PublishStage, Publisher};
use crate::utils::error::{FetchError, StoreError};
use crate::utils::truncate_text;

/// Default number of locator attempts per run
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

// ============================================================================
// States and outcomes
// ============================================================================

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    GateCheck,
    Selecting,
    FetchingImage,
    Publishing,
    Recording,
    Done,
    Suppressed,
    Exhausted,
    Failed,
}

impl RunState {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GateCheck => "gate_check",
            Self::Selecting => "selecting",
            Self::FetchingImage => "fetching_image",
            Self::Publishing => "publishing",
            Self::Recording => "recording",
            Self::Done => "done",
            Self::Suppressed => "suppressed",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
        }
    }

    /// Whether the run stops in this state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::Suppressed | Self::Exhausted | Self::Failed
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful post
#[derive(Debug, Clone, Serialize)]
pub struct PostReceipt {
    /// Article title (also the post text)
    pub title: String,
    /// Timeline image URL
    pub image_url: String,
    /// Image MIME type
    pub content_type: String,
    /// Image size in bytes
    pub image_bytes: usize,
    /// Identifier of the created post
    pub post_id: PostId,
    /// Locator attempts spent
    pub attempts: u32,
    /// Whether the gate marker was written
    pub recorded: bool,
}

/// How a run that did not fail ended
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// A post was created
    Posted(PostReceipt),
    /// The suppression window has not elapsed
    Suppressed,
}

impl RunOutcome {
    /// Terminal state of the run
    pub fn state(&self) -> RunState {
        match self {
            Self::Posted(_) => RunState::Done,
            Self::Suppressed => RunState::Suppressed,
        }
    }
}

/// What a run would post, without posting it
#[derive(Debug, Clone, Serialize)]
pub struct PreviewReport {
    /// Article title
    pub title: String,
    /// Text the post would carry
    pub post_text: String,
    /// Timeline image URL
    pub image_url: String,
    /// Image MIME type
    pub content_type: String,
    /// Image size in bytes
    pub image_bytes: usize,
    /// Locator attempts spent
    pub attempts: u32,
    /// Downloaded image
    #[serde(skip)]
    pub payload: ImagePayload,
}

/// Outcome of the selection loop
#[derive(Debug, Clone)]
pub struct Selection {
    /// Chosen image
    pub image: TimelineImage,
    /// Draws made, including the hit
    pub attempts: u32,
    /// Size of the candidate list drawn from
    pub candidates: usize,
}

/// Errors that end a run
#[derive(Debug, Error)]
pub enum RunError {
    /// No sampled candidate had a timeline image
    #[error("No timeline image found after {attempts} attempts")]
    NotFound { attempts: u32 },

    /// Wiki request failed
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] FetchError),

    /// Publisher failed
    #[error("Publishing failed: {0}")]
    Publish(#[from] PublishError),

    /// Marker could not be read
    #[error("Post gate unavailable: {0}")]
    Gate(#[from] StoreError),
}

impl RunError {
    /// State the run ended in
    pub fn terminal_state(&self) -> RunState {
        match self {
            Self::NotFound { .. } => RunState::Exhausted,
            _ => RunState::Failed,
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Composes lister, locator, fetcher, gate and publisher into one run
pub struct PostOrchestrator {
    lister: Arc<dyn CategoryLister>,
    locator: Arc<dyn ImageLocator>,
    fetcher: Arc<dyn ImageFetcher>,
    publisher: Arc<dyn Publisher>,
    gate: PostGate,
    max_attempts: u32,
    rng: Mutex<ChaCha8Rng>,
}

impl PostOrchestrator {
    /// Start building an orchestrator
    pub fn builder() -> PostOrchestratorBuilder {
        PostOrchestratorBuilder::default()
    }

    /// Attempts per selection
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Name of the configured publisher
    pub fn publisher_name(&self) -> &str {
        self.publisher.name()
    }

    /// Run one full orchestration
    ///
    /// # Errors
    ///
    /// `RunError::NotFound` when selection is exhausted; the other variants
    /// when a collaborator fails. A failure to record the marker after a
    /// successful post is not an error (see [`PostReceipt::recorded`]).
    pub async fn run(&self) -> Result<RunOutcome, RunError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", run_id = %run_id);
        let _timer = metrics::start_operation_timer("run");

        let result = self.run_inner().instrument(span).await;

        let outcome = match &result {
            Ok(RunOutcome::Posted(_)) => "posted",
            Ok(RunOutcome::Suppressed) => "suppressed",
            Err(e) => e.terminal_state().as_str(),
        };
        metrics::record_run(outcome);

        result
    }

    async fn run_inner(&self) -> Result<RunOutcome, RunError> {
        tracing::debug!(state = %RunState::GateCheck, "Checking post gate");
        if !self.gate.is_post_allowed().await? {
            tracing::info!(state = %RunState::Suppressed, "Already posted within the window, skipping");
            return Ok(RunOutcome::Suppressed);
        }

        let selection = self.select().await?;
        let image = selection.image;

        tracing::debug!(state = %RunState::FetchingImage, url = %image.image_url, "Downloading image");
        let payload = self.fetcher.fetch_image(&image.image_url).await?;
        metrics::record_image_bytes(payload.len());

        tracing::debug!(state = %RunState::Publishing, publisher = self.publisher.name(), "Publishing");
        let post_id = self.publish(&image.title, &payload).await?;

        tracing::debug!(state = %RunState::Recording, "Recording post");
        let recorded = match self.gate.record_post(self.gate.now()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    post_id = %post_id,
                    "Post created but marker not recorded; the next run may post again"
                );
                false
            }
        };

        tracing::info!(
            state = %RunState::Done,
            title = %image.title,
            post_id = %post_id,
            attempts = selection.attempts,
            "Timeline posted"
        );

        Ok(RunOutcome::Posted(PostReceipt {
            title: image.title,
            image_url: image.image_url,
            content_type: payload.content_type,
            image_bytes: payload.bytes.len(),
            post_id,
            attempts: selection.attempts,
            recorded,
        }))
    }

    /// Fresh session per run; the title doubles as the image description
    async fn open_and_publish(&self, title: &str, payload: &ImagePayload) -> PublishResult<PostId> {
        let session = self.publisher.open_session().await?;
        session.publish(title, payload, title).await
    }

    async fn publish(&self, title: &str, payload: &ImagePayload) -> Result<PostId, RunError> {
        self.open_and_publish(title, payload).await.map_err(|e| {
            let stage = e.stage();
            metrics::record_publish_failure(stage.map_or("config", |s| s.as_str()));
            if stage == Some(PublishStage::Post) {
                tracing::error!(error = %e, "Image uploaded but post creation failed");
            } else {
                tracing::error!(error = %e, stage = ?stage, "Publishing failed");
            }
            RunError::Publish(e)
        })
    }

    /// Selection and download without publishing or touching the gate
    pub async fn preview(&self) -> Result<PreviewReport, RunError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("preview", run_id = %run_id);
        let _timer = metrics::start_operation_timer("preview");

        self.preview_inner().instrument(span).await
    }

    async fn preview_inner(&self) -> Result<PreviewReport, RunError> {
        let selection = self.select().await?;
        let image = selection.image;
        let payload = self.fetcher.fetch_image(&image.image_url).await?;
        metrics::record_image_bytes(payload.len());

        tracing::info!(title = %image.title, size = payload.len(), "Preview ready");

        Ok(PreviewReport {
            post_text: truncate_text(&image.title, MAX_POST_CHARS),
            title: image.title,
            image_url: image.image_url,
            content_type: payload.content_type.clone(),
            image_bytes: payload.len(),
            attempts: selection.attempts,
            payload,
        })
    }

    /// Filtered candidate list
    pub async fn candidates(&self) -> Result<Vec<String>, RunError> {
        Ok(self.lister.list_candidates().await?)
    }

    /// Diagnostic view of the gate
    pub async fn gate_status(&self) -> Result<GateStatus, RunError> {
        Ok(self.gate.status().await?)
    }

    /// Draw titles until one has a timeline image
    ///
    /// # Errors
    ///
    /// `RunError::NotFound` if the list is empty or every draw missed;
    /// `RunError::Upstream` on the first lister or locator failure.
    pub async fn select(&self) -> Result<Selection, RunError> {
        tracing::debug!(state = %RunState::Selecting, "Listing candidates");
        let candidates = self.lister.list_candidates().await?;

        if candidates.is_empty() {
            tracing::warn!(state = %RunState::Exhausted, "Candidate list is empty");
            metrics::record_selection(0, 0);
            return Err(RunError::NotFound { attempts: 0 });
        }

        for attempt in 1..=self.max_attempts {
            let title = &candidates[self.draw(candidates.len())];
            tracing::debug!(attempt, title = %title, "Trying candidate");

            if let Some(image) = self.locator.locate_image(title).await? {
                metrics::record_selection(attempt, candidates.len());
                return Ok(Selection {
                    image,
                    attempts: attempt,
                    candidates: candidates.len(),
                });
            }
        }

        tracing::warn!(
            state = %RunState::Exhausted,
            attempts = self.max_attempts,
            candidates = candidates.len(),
            "No timeline image found"
        );
        metrics::record_selection(self.max_attempts, candidates.len());
        Err(RunError::NotFound {
            attempts: self.max_attempts,
        })
    }

    /// Uniform index in `0..len`
    fn draw(&self, len: usize) -> usize {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(0..len)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`PostOrchestrator`]
#[derive(Default)]
pub struct PostOrchestratorBuilder {
    lister: Option<Arc<dyn CategoryLister>>,
    locator: Option<Arc<dyn ImageLocator>>,
    fetcher: Option<Arc<dyn ImageFetcher>>,
    publisher: Option<Arc<dyn Publisher>>,
    gate: Option<PostGate>,
    max_attempts: Option<u32>,
    seed: Option<u64>,
}

impl PostOrchestratorBuilder {
    /// Set the candidate lister
    pub fn lister(mut self, lister: Arc<dyn CategoryLister>) -> Self {
        self.lister = Some(lister);
        self
    }

    /// Set the image locator
    pub fn locator(mut self, locator: Arc<dyn ImageLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Set the image fetcher
    pub fn fetcher(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Set the publisher
    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Set the post gate
    pub fn gate(mut self, gate: PostGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Set attempts per selection
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Seed the selection RNG; `None` seeds from OS entropy
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a collaborator is missing or
    /// `max_attempts` is zero
    pub fn build(self) -> crate::error::Result<PostOrchestrator> {
        use crate::error::Error;

        let max_attempts = self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(Error::config("max_attempts must be at least 1"));
        }

        let rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Ok(PostOrchestrator {
            lister: self.lister.ok_or_else(|| Error::config("lister is required"))?,
            locator: self.locator.ok_or_else(|| Error::config("locator is required"))?,
            fetcher: self.fetcher.ok_or_else(|| Error::config("fetcher is required"))?,
            publisher: self
                .publisher
                .ok_or_else(|| Error::config("publisher is required"))?,
            gate: self.gate.ok_or_else(|| Error::config("gate is required"))?,
            max_attempts,
            rng: Mutex::new(rng),
        })
    }
}
