//! Prometheus metrics for runs, selection and the HTTP API
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_gauge, register_histogram, register_histogram_vec, register_int_counter_vec, Encoder,
    Gauge, Histogram, HistogramVec, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all bot metrics
struct BotMetrics {
    runs: IntCounterVec,
    run_duration: HistogramVec,
    selection_attempts: Histogram,
    candidates: Gauge,
    image_bytes: Histogram,
    publish_failures: IntCounterVec,
    api_requests: IntCounterVec,
}

/// Global storage; `None` when registration failed
static METRICS: OnceLock<Option<BotMetrics>> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

fn register() -> Result<BotMetrics, prometheus::Error> {
    Ok(BotMetrics {
        runs: register_int_counter_vec!(
            "wikitimelines_runs_total",
            "Orchestration runs by terminal outcome",
            &["outcome"]
        )?,
        run_duration: register_histogram_vec!(
            "wikitimelines_run_duration_seconds",
            "Wall time of orchestrator operations in seconds",
            &["operation"],
            vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
        )?,
        selection_attempts: register_histogram!(
            "wikitimelines_selection_attempts",
            "Locator attempts spent per selection",
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 10.0]
        )?,
        candidates: register_gauge!(
            "wikitimelines_candidates",
            "Size of the most recent filtered candidate list"
        )?,
        image_bytes: register_histogram!(
            "wikitimelines_image_bytes",
            "Size of downloaded timeline images in bytes",
            vec![10_000.0, 50_000.0, 100_000.0, 250_000.0, 500_000.0, 1_000_000.0, 5_000_000.0]
        )?,
        publish_failures: register_int_counter_vec!(
            "wikitimelines_publish_failures_total",
            "Publish failures by stage",
            &["stage"]
        )?,
        api_requests: register_int_counter_vec!(
            "wikitimelines_api_requests_total",
            "HTTP API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
    })
}

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = wikitimelines::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
///     // Application can continue without metrics
/// }
/// ```
pub fn init_metrics() -> Result<(), String> {
    let metrics = METRICS.get_or_init(|| match register() {
        Ok(m) => {
            tracing::info!("Prometheus metrics initialized successfully");
            Some(m)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus metrics registration failed");
            None
        }
    });

    if metrics.is_some() {
        Ok(())
    } else {
        Err("metrics registration failed".to_string())
    }
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    matches!(METRICS.get(), Some(Some(_)))
}

fn metrics() -> Option<&'static BotMetrics> {
    METRICS.get().and_then(Option::as_ref)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a finished run (`posted`, `suppressed`, `exhausted`, `failed`)
pub fn record_run(outcome: &str) {
    if let Some(m) = metrics() {
        m.runs.with_label_values(&[outcome]).inc();
    }
}

/// Record how many locator attempts a selection took
pub fn record_selection(attempts: u32, candidates: usize) {
    if let Some(m) = metrics() {
        m.selection_attempts.observe(f64::from(attempts));
        m.candidates.set(candidates as f64);
    }
}

/// Record the size of a downloaded image
pub fn record_image_bytes(size: usize) {
    if let Some(m) = metrics() {
        m.image_bytes.observe(size as f64);
    }
}

/// Record a publish failure at `stage`
pub fn record_publish_failure(stage: &str) {
    if let Some(m) = metrics() {
        m.publish_failures.with_label_values(&[stage]).inc();
    }
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16) {
    if let Some(m) = metrics() {
        let status_str = status.to_string();
        m.api_requests
            .with_label_values(&[endpoint, status_str.as_str()])
            .inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start timing an orchestrator operation (`run`, `preview`)
pub fn start_operation_timer(operation: &str) -> MetricsTimer {
    match metrics() {
        Some(m) => MetricsTimer::new(
            m.run_duration
                .with_label_values(&[operation])
                .start_timer(),
        ),
        None => MetricsTimer::noop(),
    }
}
