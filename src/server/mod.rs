//! HTTP surface and scheduled trigger
//!
//! # Routes
//!
//! ```text
//! GET  /              route index
//! ANY  /post          one orchestration run (path configurable)
//! GET  /preview       selection + download, no publish (path configurable)
//! GET  /candidates    filtered candidate titles
//! GET  /health        liveness, version, uptime
//! GET  /metrics       Prometheus exposition
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wikitimelines::server::TimelineServer;
//!
//! let server = TimelineServer::new(config.server.clone(), &config.schedule, orchestrator);
//! server.start_with_shutdown(shutdown_signal()).await?;
//! ```

pub mod api;
pub mod http;
pub mod trigger;

// Re-export main types
pub use api::create_router;
pub use http::{AppState, ServerError, ServerInfo, TimelineServer};
pub use trigger::{ScheduledTrigger, TriggerStatus};
