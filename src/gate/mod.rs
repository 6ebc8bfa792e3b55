//! Duplicate-post suppression
//!
//! The gate keeps a single marker in a [`KvStore`]: the time of the last
//! successful post. The marker is written with an expiry slightly longer than
//! the suppression window, so an absent marker means "never posted" and the
//! store needs no cleanup.
//!
//! Two comparison policies exist and they are not equivalent near midnight:
//!
//! - [`SuppressionPolicy::Rolling`] denies while less than the window has
//!   elapsed since the marker. This is the default.
//! - [`SuppressionPolicy::CalendarDay`] denies while the marker falls on the
//!   same UTC calendar day as now.

pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GateConfig;
use crate::storage::KvStore;
use crate::utils::error::StoreError;

/// How the gate decides that a post already happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuppressionPolicy {
    /// At most one post per rolling window
    #[default]
    Rolling,
    /// At most one post per UTC calendar day
    CalendarDay,
}

impl SuppressionPolicy {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rolling => "rolling",
            Self::CalendarDay => "calendar-day",
        }
    }
}

impl fmt::Display for SuppressionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuppressionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "rolling" => Ok(Self::Rolling),
            "calendar-day" | "day" => Ok(Self::CalendarDay),
            other => Err(format!("unknown suppression policy '{other}'")),
        }
    }
}

/// Snapshot of the gate for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct GateStatus {
    /// Whether a post would be allowed right now
    pub allowed: bool,
    /// Raw marker value, if present
    pub last_post: Option<String>,
    /// Active policy
    pub policy: SuppressionPolicy,
}

/// Decides whether a new post is allowed and records successful posts
#[derive(Clone)]
pub struct PostGate {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    policy: SuppressionPolicy,
    window: Duration,
    marker_ttl: Duration,
    marker_key: String,
}

impl PostGate {
    /// Create a gate over `store` using the given settings
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: &GateConfig) -> Self {
        Self {
            store,
            clock,
            policy: config.policy,
            window: config.window(),
            marker_ttl: config.marker_ttl(),
            marker_key: config.marker_key.clone(),
        }
    }

    /// Current time according to the gate's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Active policy
    pub fn policy(&self) -> SuppressionPolicy {
        self.policy
    }

    /// Whether the suppression window has elapsed (or nothing was ever posted)
    ///
    /// # Errors
    ///
    /// Returns the store error if the marker cannot be read.
    pub async fn is_post_allowed(&self) -> Result<bool, StoreError> {
        let marker = self.store.get(&self.marker_key).await?;
        Ok(self.evaluate(marker.as_deref()))
    }

    /// Record a successful post made at `when`
    ///
    /// # Errors
    ///
    /// Returns the store error if the marker cannot be written.
    pub async fn record_post(&self, when: DateTime<Utc>) -> Result<(), StoreError> {
        let value = when.to_rfc3339();
        self.store
            .put(&self.marker_key, &value, self.marker_ttl)
            .await?;
        tracing::debug!(marker = %value, ttl_secs = self.marker_ttl.as_secs(), "Recorded post marker");
        Ok(())
    }

    /// Diagnostic view of the marker and the decision it produces
    pub async fn status(&self) -> Result<GateStatus, StoreError> {
        let marker = self.store.get(&self.marker_key).await?;
        Ok(GateStatus {
            allowed: self.evaluate(marker.as_deref()),
            last_post: marker,
            policy: self.policy,
        })
    }

    fn evaluate(&self, marker: Option<&str>) -> bool {
        let Some(raw) = marker else {
            return true;
        };

        let Some(last) = parse_marker(raw) else {
            tracing::warn!(marker = %raw, "Unreadable post marker, suppressing until it expires");
            return false;
        };

        let now = self.clock.now();
        match self.policy {
            SuppressionPolicy::Rolling => {
                let elapsed = now.signed_duration_since(last);
                match elapsed.to_std() {
                    Ok(elapsed) => elapsed >= self.window,
                    // marker in the future: treat as just posted
                    Err(_) => false,
                }
            }
            SuppressionPolicy::CalendarDay => last.date_naive() != now.date_naive(),
        }
    }
}

/// Parse a stored marker
///
/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (read as midnight
/// UTC).
pub fn parse_marker(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
