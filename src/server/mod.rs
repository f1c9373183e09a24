//! HTTP server.
//!
//! This module provides:
//! - REST API using axum
//! - Health, status and metrics endpoints
//! - Tracing and Prometheus instrumentation

mod app;
pub mod metrics;
mod observability;
mod rest;

pub use app::{App, ServerConfig};
pub use metrics::init_metrics;
pub use observability::{init_tracing, request_id, spans};
pub use rest::{create_rest_router, AppState, EmbeddingResponse, HealthResponse, IMAGE_FIELD};
