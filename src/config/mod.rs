//! Configuration management for the wikitimelines bot
//!
//! Configuration is loaded from a TOML file or from environment variables,
//! falling back to defaults for anything unset, and then validated.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::gate::SuppressionPolicy;

/// Category whose members are the candidate articles
pub const DEFAULT_CATEGORY: &str = "Category:Articles_which_contain_graphical_timelines";

/// Keywords for article topics that tend to produce dull timelines
pub const DEFAULT_DENYLIST: &[&str] = &["hurricane", "cyclone", "typhoon", "season", "conference"];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wiki endpoints and candidate filtering
    pub wiki: WikiConfig,

    /// Candidate selection
    pub selection: SelectionConfig,

    /// Duplicate-post suppression
    pub gate: GateConfig,

    /// Marker storage backend
    pub store: StoreConfig,

    /// Bluesky account
    pub bluesky: BlueskyConfig,

    /// HTTP server
    pub server: ServerConfig,

    /// Scheduled trigger
    pub schedule: ScheduleConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Wiki-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiConfig {
    /// MediaWiki action API endpoint
    pub api_url: String,

    /// Site origin used for article pages and root-relative image URLs
    pub site_origin: String,

    /// Category to enumerate
    pub category: String,

    /// Case-insensitive keywords; titles containing any of them are dropped
    pub denylist: Vec<String>,

    /// Namespace filter for category members (0 = articles)
    pub namespace: i32,

    /// Titles requested per API page (MediaWiki caps this at 500)
    pub page_size: u32,

    /// Maximum number of API pages followed
    pub max_pages: u32,

    /// User agent string
    pub user_agent: String,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Rate limit (requests per second)
    pub requests_per_second: u32,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            api_url: String::from("https://en.wikipedia.org/w/api.php"),
            site_origin: String::from("https://en.wikipedia.org"),
            category: DEFAULT_CATEGORY.to_string(),
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
            namespace: 0,
            page_size: 500,
            max_pages: 4,
            user_agent: default_user_agent(),
            request_timeout_secs: 30,
            requests_per_second: 5,
        }
    }
}

/// Candidate selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Upper bound on locator attempts per run
    pub max_attempts: u32,

    /// Fixed RNG seed for reproducible selection
    pub seed: Option<u64>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            seed: None,
        }
    }
}

/// Suppression gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// How "already posted" is decided
    pub policy: SuppressionPolicy,

    /// Minimum interval between posts, in seconds
    pub window_secs: u64,

    /// Marker expiry in seconds; must not be shorter than the window
    pub marker_ttl_secs: u64,

    /// Key under which the marker is stored
    pub marker_key: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            policy: SuppressionPolicy::default(),
            window_secs: 24 * 60 * 60,
            marker_ttl_secs: 25 * 60 * 60,
            marker_key: String::from("last_post_at"),
        }
    }
}

impl GateConfig {
    /// Suppression window as Duration
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Marker expiry as Duration
    #[must_use]
    pub fn marker_ttl(&self) -> Duration {
        Duration::from_secs(self.marker_ttl_secs)
    }
}

/// Which key-value backend holds the gate marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process memory; lost on restart
    Memory,
    /// JSON file on local disk
    #[default]
    File,
    /// Redis server
    Redis,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Marker storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection
    pub backend: StoreBackend,

    /// Redis URL (e.g., redis://localhost:6379)
    pub redis_url: String,

    /// Connection pool size
    pub pool_size: usize,

    /// Key prefix for namespacing
    pub key_prefix: String,

    /// State file for the file backend
    pub file_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            redis_url: String::from("redis://localhost:6379"),
            pool_size: 4,
            key_prefix: String::from("wikitimelines"),
            file_path: PathBuf::from("data/state.json"),
        }
    }
}

/// Bluesky account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueskyConfig {
    /// PDS base URL
    pub service_url: String,

    /// Account handle (e.g., wikitimelines.bsky.social)
    pub handle: Option<String>,

    /// App password
    #[serde(skip_serializing)]
    pub app_password: Option<String>,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            service_url: String::from("https://bsky.social"),
            handle: None,
            app_password: None,
            request_timeout_secs: 30,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Route that triggers a post
    pub post_path: String,

    /// Route that previews a post without publishing
    pub preview_path: String,

    /// Enable CORS for the API
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            post_path: String::from("/post"),
            preview_path: String::from("/preview"),
            enable_cors: false,
            enable_request_logging: true,
        }
    }
}

/// Scheduled trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Run the orchestrator periodically while serving
    pub enabled: bool,

    /// Interval between scheduled runs, in seconds
    pub interval_secs: u64,

    /// Fire once immediately at startup
    pub run_on_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60 * 60,
            run_on_startup: false,
        }
    }
}

impl ScheduleConfig {
    /// Interval as Duration
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn default_user_agent() -> String {
    format!(
        "wikitimelines/{} (graphical timeline bot; https://bsky.app)",
        env!("CARGO_PKG_VERSION")
    )
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    ///
    /// `from_env` delegates here; tests pass a map lookup instead of
    /// mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let denylist = lookup("WIKITIMELINES_DENYLIST")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.wiki.denylist);

        let policy = match lookup("WIKITIMELINES_GATE_POLICY") {
            Some(v) => v
                .parse::<SuppressionPolicy>()
                .map_err(anyhow::Error::msg)
                .context("Invalid WIKITIMELINES_GATE_POLICY")?,
            None => defaults.gate.policy,
        };

        let backend = match lookup("WIKITIMELINES_STORE") {
            Some(v) => v
                .parse::<StoreBackend>()
                .map_err(anyhow::Error::msg)
                .context("Invalid WIKITIMELINES_STORE")?,
            None => defaults.store.backend,
        };

        let bind_address = match lookup("WIKITIMELINES_BIND") {
            Some(v) => v
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid WIKITIMELINES_BIND: {v}"))?,
            None => match lookup("PORT").and_then(|p| p.parse::<u16>().ok()) {
                Some(port) => SocketAddr::from(([0, 0, 0, 0], port)),
                None => defaults.server.bind_address,
            },
        };

        let config = Self {
            wiki: WikiConfig {
                api_url: lookup("WIKITIMELINES_API_URL").unwrap_or(defaults.wiki.api_url),
                site_origin: lookup("WIKITIMELINES_SITE_ORIGIN")
                    .unwrap_or(defaults.wiki.site_origin),
                category: lookup("WIKITIMELINES_CATEGORY").unwrap_or(defaults.wiki.category),
                denylist,
                namespace: parse_or(&lookup, "WIKITIMELINES_NAMESPACE", defaults.wiki.namespace),
                page_size: parse_or(&lookup, "WIKITIMELINES_PAGE_SIZE", defaults.wiki.page_size),
                max_pages: parse_or(&lookup, "WIKITIMELINES_MAX_PAGES", defaults.wiki.max_pages),
                user_agent: lookup("WIKITIMELINES_USER_AGENT").unwrap_or(defaults.wiki.user_agent),
                request_timeout_secs: parse_or(
                    &lookup,
                    "WIKITIMELINES_REQUEST_TIMEOUT",
                    defaults.wiki.request_timeout_secs,
                ),
                requests_per_second: parse_or(
                    &lookup,
                    "WIKITIMELINES_RATE_LIMIT",
                    defaults.wiki.requests_per_second,
                ),
            },
            selection: SelectionConfig {
                max_attempts: parse_or(
                    &lookup,
                    "WIKITIMELINES_MAX_ATTEMPTS",
                    defaults.selection.max_attempts,
                ),
                seed: lookup("WIKITIMELINES_SEED").and_then(|v| v.parse().ok()),
            },
            gate: GateConfig {
                policy,
                window_secs: parse_or(&lookup, "WIKITIMELINES_WINDOW_SECS", defaults.gate.window_secs),
                marker_ttl_secs: parse_or(
                    &lookup,
                    "WIKITIMELINES_MARKER_TTL_SECS",
                    defaults.gate.marker_ttl_secs,
                ),
                marker_key: lookup("WIKITIMELINES_MARKER_KEY").unwrap_or(defaults.gate.marker_key),
            },
            store: StoreConfig {
                backend,
                redis_url: lookup("REDIS_URL").unwrap_or(defaults.store.redis_url),
                pool_size: parse_or(&lookup, "REDIS_POOL_SIZE", defaults.store.pool_size),
                key_prefix: lookup("WIKITIMELINES_KEY_PREFIX").unwrap_or(defaults.store.key_prefix),
                file_path: lookup("WIKITIMELINES_STATE_FILE")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.store.file_path),
            },
            bluesky: BlueskyConfig {
                service_url: lookup("BLUESKY_SERVICE").unwrap_or(defaults.bluesky.service_url),
                handle: lookup("BLUESKY_HANDLE"),
                app_password: lookup("BLUESKY_APP_PASSWORD").or_else(|| lookup("BLUESKY_PASSWORD")),
                request_timeout_secs: parse_or(
                    &lookup,
                    "BLUESKY_REQUEST_TIMEOUT",
                    defaults.bluesky.request_timeout_secs,
                ),
            },
            server: ServerConfig {
                bind_address,
                post_path: lookup("WIKITIMELINES_POST_PATH").unwrap_or(defaults.server.post_path),
                preview_path: lookup("WIKITIMELINES_PREVIEW_PATH")
                    .unwrap_or(defaults.server.preview_path),
                enable_cors: parse_or(&lookup, "WIKITIMELINES_CORS", defaults.server.enable_cors),
                enable_request_logging: parse_or(
                    &lookup,
                    "WIKITIMELINES_REQUEST_LOGGING",
                    defaults.server.enable_request_logging,
                ),
            },
            schedule: ScheduleConfig {
                enabled: parse_or(&lookup, "WIKITIMELINES_SCHEDULE", defaults.schedule.enabled),
                interval_secs: parse_or(
                    &lookup,
                    "WIKITIMELINES_SCHEDULE_INTERVAL",
                    defaults.schedule.interval_secs,
                ),
                run_on_startup: parse_or(
                    &lookup,
                    "WIKITIMELINES_RUN_ON_STARTUP",
                    defaults.schedule.run_on_startup,
                ),
            },
            logging: LoggingConfig {
                level: lookup("WIKITIMELINES_LOG_LEVEL").unwrap_or(defaults.logging.level),
                format: lookup("WIKITIMELINES_LOG_FORMAT").unwrap_or(defaults.logging.format),
            },
        };

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.wiki.category.trim().is_empty() {
            anyhow::bail!("wiki.category must not be empty");
        }

        for (field, value) in [
            ("wiki.api_url", &self.wiki.api_url),
            ("wiki.site_origin", &self.wiki.site_origin),
            ("bluesky.service_url", &self.bluesky.service_url),
        ] {
            url::Url::parse(value).with_context(|| format!("{field} is not a valid URL: {value}"))?;
        }

        if self.wiki.page_size == 0 || self.wiki.page_size > 500 {
            anyhow::bail!("wiki.page_size must be between 1 and 500");
        }

        if self.wiki.max_pages == 0 {
            anyhow::bail!("wiki.max_pages must be greater than 0");
        }

        if self.wiki.requests_per_second == 0 {
            anyhow::bail!("wiki.requests_per_second must be greater than 0");
        }

        if self.selection.max_attempts == 0 {
            anyhow::bail!("selection.max_attempts must be greater than 0");
        }

        if self.gate.window_secs == 0 {
            anyhow::bail!("gate.window_secs must be greater than 0");
        }

        if self.gate.marker_ttl_secs < self.gate.window_secs {
            anyhow::bail!("gate.marker_ttl_secs must not be shorter than gate.window_secs");
        }

        if self.gate.marker_key.trim().is_empty() {
            anyhow::bail!("gate.marker_key must not be empty");
        }

        if self.store.backend == StoreBackend::Redis && self.store.pool_size == 0 {
            anyhow::bail!("store.pool_size must be greater than 0");
        }

        for (field, path) in [
            ("server.post_path", &self.server.post_path),
            ("server.preview_path", &self.server.preview_path),
        ] {
            if !path.starts_with('/') || path.len() < 2 {
                anyhow::bail!("{field} must start with '/' and name a route, got '{path}'");
            }
            if RESERVED_PATHS.contains(&path.as_str()) {
                anyhow::bail!("{field} collides with built-in route '{path}'");
            }
        }

        if self.server.post_path == self.server.preview_path {
            anyhow::bail!("server.post_path and server.preview_path must differ");
        }

        if self.schedule.enabled && self.schedule.interval_secs == 0 {
            anyhow::bail!("schedule.interval_secs must be greater than 0");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.wiki.request_timeout_secs)
    }
}

/// Routes the server always mounts
pub const RESERVED_PATHS: &[&str] = &["/candidates", "/health", "/metrics"];
