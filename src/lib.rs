//! wikitimelines - Wikipedia graphical timeline bot
//!
//! Picks a random article from the graphical-timelines category, extracts
//! its rendered timeline image and posts it to Bluesky, at most once per
//! suppression window.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Category listing and image download with rate limiting
//! - [`parser`] - Article HTML scraping for the timeline image
//! - [`gate`] - Once-per-window post suppression
//! - [`storage`] - Key-value backends for the post marker (memory, file, Redis)
//! - [`publisher`] - Bluesky client
//! - [`orchestrator`] - The run state machine tying the above together
//! - [`server`] - HTTP routes and the scheduled trigger
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use wikitimelines::app::build_orchestrator;
//! use wikitimelines::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let orchestrator = build_orchestrator(&config).await?;
//!     let outcome = orchestrator.run().await?;
//!     println!("{:?}", outcome.state());
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod config;
pub mod crawler;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod orchestrator;
pub mod parser;
pub mod publisher;
pub mod server;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{CategoryLister, ImageFetcher, ImagePayload};
    pub use crate::error::{Error, Result};
    pub use crate::gate::{Clock, PostGate, SuppressionPolicy};
    pub use crate::orchestrator::{PostOrchestrator, RunError, RunOutcome, RunState};
    pub use crate::parser::{ImageLocator, TimelineImage};
    pub use crate::publisher::{PostId, PublishSession, Publisher};
    pub use crate::storage::KvStore;
}

// Direct re-exports for convenience
pub use orchestrator::{PostOrchestrator, RunOutcome, RunState};
