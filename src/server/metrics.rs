//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};

/// Request latency histogram.
pub static REQUEST_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "clip_embed_request_duration_seconds",
        "Request latency in seconds",
        &["endpoint"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap()
});

/// Request counter.
pub static REQUEST_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "clip_embed_requests_total",
        "Total number of requests",
        &["endpoint", "status"]
    )
    .unwrap()
});

/// Time spent producing one embedding, queue wait included.
pub static EMBEDDING_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "clip_embed_embedding_duration_seconds",
        "Embedding latency in seconds",
        &["modality"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .unwrap()
});

/// Embeddings produced.
pub static EMBEDDINGS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "clip_embed_embeddings_total",
        "Total number of embeddings produced",
        &["modality"]
    )
    .unwrap()
});

/// Failed embedding attempts.
pub static EMBEDDING_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "clip_embed_embedding_failures_total",
        "Total number of failed embedding attempts",
        &["modality", "kind"]
    )
    .unwrap()
});

/// Embedding queue depth.
pub static EMBEDDING_QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "clip_embed_embedding_queue_depth",
        "Number of requests waiting for an embedding worker"
    )
    .unwrap()
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    // Access lazy statics to register them
    let _ = &*REQUEST_LATENCY;
    let _ = &*REQUEST_COUNT;
    let _ = &*EMBEDDING_LATENCY;
    let _ = &*EMBEDDINGS_TOTAL;
    let _ = &*EMBEDDING_FAILURES;
    let _ = &*EMBEDDING_QUEUE_DEPTH;

    tracing::debug!("Prometheus metrics initialized");
}
