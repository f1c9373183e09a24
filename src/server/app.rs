//! Main application server.
//!
//! Provides the complete server application with signal handling
//! and graceful shutdown coordination.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::metrics::{REQUEST_COUNT, REQUEST_LATENCY};
use super::observability::{request_id, spans};
use super::rest::{create_rest_router, AppState};
use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use crate::embeddings::EmbeddingService;
use crate::Result;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum request body size in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl From<&crate::Config> for ServerConfig {
    fn from(config: &crate::Config) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Application server.
pub struct App {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl App {
    /// Create a new application around a running embedding service.
    #[must_use]
    pub fn new(config: ServerConfig, service: EmbeddingService) -> Self {
        let state = Arc::new(AppState::new(service));
        Self { config, state }
    }

    /// Build the router with all endpoints.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        create_rest_router(Arc::clone(&self.state))
            .route_layer(middleware::from_fn(track_metrics))
            .layer(DefaultBodyLimit::max(self.config.max_upload_bytes))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|request: &axum::http::Request<_>| {
                        spans::request_span(
                            request.method().as_str(),
                            &request.uri().to_string(),
                            &request_id(request.headers()),
                        )
                    })
                    .on_response(
                        |response: &axum::response::Response,
                         latency: std::time::Duration,
                         _span: &tracing::Span| {
                            tracing::info!(
                                status = %response.status(),
                                latency_ms = latency.as_millis(),
                                "Request completed"
                            );
                        },
                    ),
            )
            .layer(cors)
    }

    /// Run the server until shutdown signal.
    ///
    /// The server listens for SIGTERM (Unix) and Ctrl+C signals,
    /// then gracefully shuts down all connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot start or encounters
    /// a fatal error during execution.
    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| crate::Error::config(format!("invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            crate::error::ServerError::BindFailed {
                address: addr.to_string(),
                reason: e.to_string(),
            }
        })?;

        tracing::info!(%addr, "Server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::error::ServerError::Request(e.to_string()))?;

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Record request count and latency per matched route.
async fn track_metrics(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_string(), |p| p.as_str().to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    REQUEST_LATENCY
        .with_label_values(&[endpoint.as_str()])
        .observe(started.elapsed().as_secs_f64());
    REQUEST_COUNT
        .with_label_values(&[endpoint.as_str(), response.status().as_str()])
        .inc();

    response
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
