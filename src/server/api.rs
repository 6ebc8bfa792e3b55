//! REST API handlers
//!
//! This module defines the API routes and handlers for the bot.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::metrics;
use crate::orchestrator::{PostReceipt, PreviewReport, RunError, RunOutcome, RunState};

use super::http::AppState;
use super::trigger::TriggerStatus;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<RunState>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
            state: None,
        }
    }

    /// Error for a run that ended in `err`
    pub fn from_run_error(err: &RunError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            state: Some(err.terminal_state()),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub publisher: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<TriggerStatus>,
}

/// One entry of the route index
#[derive(Debug, Serialize)]
pub struct RouteInfo {
    pub path: String,
    pub method: &'static str,
    pub description: &'static str,
}

/// Route index response
#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub routes: Vec<RouteInfo>,
}

/// Trigger response
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub state: RunState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<PostReceipt>,
}

impl From<RunOutcome> for RunResponse {
    fn from(outcome: RunOutcome) -> Self {
        let state = outcome.state();
        match outcome {
            RunOutcome::Posted(receipt) => Self {
                state,
                message: format!("posted \"{}\"", receipt.title),
                receipt: Some(receipt),
            },
            RunOutcome::Suppressed => Self {
                state,
                message: "already posted".to_string(),
                receipt: None,
            },
        }
    }
}

/// Candidate list response
#[derive(Debug, Serialize)]
pub struct CandidatesResponse {
    pub count: usize,
    pub candidates: Vec<String>,
}

/// Preview query parameters
#[derive(Debug, Default, Deserialize)]
pub struct PreviewQuery {
    /// `html` renders a page instead of JSON
    pub format: Option<String>,
}

/// HTTP status for a failed run
pub fn status_for(err: &RunError) -> StatusCode {
    match err {
        RunError::NotFound { .. } => StatusCode::NOT_FOUND,
        RunError::Upstream(_) | RunError::Publish(_) => StatusCode::BAD_GATEWAY,
        RunError::Gate(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let post_path = state.config.post_path.clone();
    let preview_path = state.config.preview_path.clone();

    Router::new()
        .route("/", get(index))
        .route(&post_path, any(trigger_post))
        .route(&preview_path, get(preview))
        .route("/candidates", get(candidates))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_text))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// List the routes this server answers
async fn index(State(state): State<AppState>) -> impl IntoResponse {
    let routes = vec![
        RouteInfo {
            path: state.config.post_path.clone(),
            method: "ANY",
            description: "Post a random timeline unless one was posted within the window",
        },
        RouteInfo {
            path: state.config.preview_path.clone(),
            method: "GET",
            description: "Pick and download a timeline without posting (?format=html for a page)",
        },
        RouteInfo {
            path: "/candidates".to_string(),
            method: "GET",
            description: "Filtered candidate article titles",
        },
        RouteInfo {
            path: "/health".to_string(),
            method: "GET",
            description: "Liveness, version and uptime",
        },
        RouteInfo {
            path: "/metrics".to_string(),
            method: "GET",
            description: "Prometheus metrics",
        },
    ];

    Json(IndexResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        routes,
    })
}

/// Run one orchestration
async fn trigger_post(State(state): State<AppState>) -> Response {
    let response = match state.orchestrator.run().await {
        Ok(outcome) => {
            (StatusCode::OK, Json(ApiResponse::success(RunResponse::from(outcome)))).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Triggered run failed");
            (status_for(&e), Json(ErrorResponse::from_run_error(&e))).into_response()
        }
    };

    metrics::record_api_request("post", response.status().as_u16());
    response
}

/// Selection and download without publishing
async fn preview(State(state): State<AppState>, Query(query): Query<PreviewQuery>) -> Response {
    let as_html = query
        .format
        .as_deref()
        .is_some_and(|f| f.eq_ignore_ascii_case("html"));

    let response = match state.orchestrator.preview().await {
        Ok(report) if as_html => Html(render_preview(&report)).into_response(),
        Ok(report) => (StatusCode::OK, Json(ApiResponse::success(report))).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Preview failed");
            (status_for(&e), Json(ErrorResponse::from_run_error(&e))).into_response()
        }
    };

    metrics::record_api_request("preview", response.status().as_u16());
    response
}

/// Filtered candidate list
async fn candidates(State(state): State<AppState>) -> Response {
    match state.orchestrator.candidates().await {
        Ok(candidates) => (
            StatusCode::OK,
            Json(ApiResponse::success(CandidatesResponse {
                count: candidates.len(),
                candidates,
            })),
        )
            .into_response(),
        Err(e) => (status_for(&e), Json(ErrorResponse::from_run_error(&e))).into_response(),
    }
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let schedule = match &state.trigger {
        Some(trigger) => Some(trigger.status().await),
        None => None,
    };

    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        publisher: state.orchestrator.publisher_name().to_string(),
        schedule,
    }))
}

/// Prometheus text exposition
async fn metrics_text() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

/// Minimal HTML page for eyeballing a candidate
pub fn render_preview(report: &PreviewReport) -> String {
    let title = html_escape::encode_text(&report.title);
    let text = html_escape::encode_text(&report.post_text);
    let image_url = html_escape::encode_double_quoted_attribute(&report.image_url);
    let alt = html_escape::encode_double_quoted_attribute(&report.title);

    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body>\n\
         <h1>{title}</h1>\n\
         <img src=\"{image_url}\" alt=\"{alt}\">\n\
         <dl>\n\
         <dt>Post text</dt><dd>{text}</dd>\n\
         <dt>Content type</dt><dd>{content_type}</dd>\n\
         <dt>Size</dt><dd>{size}</dd>\n\
         <dt>Attempts</dt><dd>{attempts}</dd>\n\
         </dl>\n\
         </body>\n\
         </html>\n",
        content_type = html_escape::encode_text(&report.content_type),
        size = crate::utils::format_bytes(report.image_bytes as u64),
        attempts = report.attempts,
    )
}

// ============================================================================
// Tests
// ============================================================================
