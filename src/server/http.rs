//! HTTP server implementation
//!
//! This module provides the server that exposes the orchestrator over HTTP
//! and drives the scheduled trigger.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{ScheduleConfig, ServerConfig};
use crate::orchestrator::PostOrchestrator;

use super::api::create_router;
use super::trigger::ScheduledTrigger;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Run orchestrator
    pub orchestrator: Arc<PostOrchestrator>,

    /// Scheduled trigger, when enabled
    pub trigger: Option<Arc<ScheduledTrigger>>,

    /// Server start time
    pub start_time: Instant,

    /// Configuration
    pub config: ServerConfig,
}

impl AppState {
    /// State without a scheduled trigger
    pub fn new(orchestrator: Arc<PostOrchestrator>, config: ServerConfig) -> Self {
        Self {
            orchestrator,
            trigger: None,
            start_time: Instant::now(),
            config,
        }
    }
}

// ============================================================================
// Timeline Server
// ============================================================================

/// HTTP front end plus periodic trigger
pub struct TimelineServer {
    config: ServerConfig,
    state: AppState,
}

impl TimelineServer {
    /// Create a new server
    pub fn new(
        config: ServerConfig,
        schedule: &ScheduleConfig,
        orchestrator: Arc<PostOrchestrator>,
    ) -> Self {
        let trigger = schedule
            .enabled
            .then(|| Arc::new(ScheduledTrigger::new(orchestrator.clone(), schedule)));

        let state = AppState {
            orchestrator,
            trigger,
            start_time: Instant::now(),
            config: config.clone(),
        };

        Self { config, state }
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        // Add CORS layer if enabled
        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        // Add tracing layer if enabled
        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Start with graceful shutdown
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.config.bind_address;

        tracing::info!("Starting wikitimelines server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        // Start background tasks
        self.start_background_tasks();

        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()));

        if let Some(trigger) = &self.state.trigger {
            trigger.stop();
        }

        result?;
        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Start background tasks
    fn start_background_tasks(&self) {
        if let Some(trigger) = self.state.trigger.clone() {
            tokio::spawn(async move {
                trigger.start().await;
            });
            tracing::info!("Background tasks started");
        } else {
            tracing::info!("Scheduled trigger disabled");
        }
    }

    /// Get server info
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            bind_address: self.config.bind_address,
            post_path: self.config.post_path.clone(),
            preview_path: self.config.preview_path.clone(),
            schedule_enabled: self.state.trigger.is_some(),
            cors_enabled: self.config.enable_cors,
            request_logging_enabled: self.config.enable_request_logging,
        }
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub post_path: String,
    pub preview_path: String,
    pub schedule_enabled: bool,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "wikitimelines server\n\
             {:-<40}\n\
             Bind Address: {}\n\
             Post Route: {}\n\
             Preview Route: {}\n\
             Schedule: {}\n\
             CORS: {}\n\
             Request Logging: {}",
            "",
            self.bind_address,
            self.post_path,
            self.preview_path,
            if self.schedule_enabled { "enabled" } else { "disabled" },
            if self.cors_enabled { "enabled" } else { "disabled" },
            if self.request_logging_enabled { "enabled" } else { "disabled" }
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind: {0}")]
    BindError(String),

    /// Server error
    #[error("Server error: {0}")]
    ServeError(String),
}
