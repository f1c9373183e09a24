//! High-level embedding service.
//!
//! Provides a convenient async API over the worker pool and records
//! per-modality metrics.

use std::sync::Arc;
use std::time::Instant;

use super::worker::EmbeddingWorker;
use super::{l2_normalize, Embedder, Modality};
use crate::server::metrics;
use crate::Result;

/// Embedding service configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Number of worker threads.
    pub num_workers: usize,

    /// Maximum number of queued requests.
    pub queue_capacity: usize,

    /// L2-normalize returned vectors.
    pub normalize: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            num_workers: 1,
            queue_capacity: 128,
            normalize: false,
        }
    }
}

impl From<&crate::Config> for EmbeddingConfig {
    fn from(config: &crate::Config) -> Self {
        Self {
            num_workers: config.workers,
            queue_capacity: config.queue_capacity,
            normalize: config.normalize,
        }
    }
}

/// High-level embedding service.
///
/// Thread-safe and can be cloned cheaply.
#[derive(Clone)]
pub struct EmbeddingService {
    inner: Arc<EmbeddingServiceInner>,
}

struct EmbeddingServiceInner {
    worker: EmbeddingWorker,
    model_name: String,
    image_dim: usize,
    text_dim: usize,
    config: EmbeddingConfig,
}

impl EmbeddingService {
    /// Start the worker pool around an already loaded model.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker threads cannot be started.
    pub fn start(embedder: Arc<dyn Embedder>, config: EmbeddingConfig) -> Result<Self> {
        let model_name = embedder.name().to_string();
        let image_dim = embedder.image_dim();
        let text_dim = embedder.text_dim();

        let worker = EmbeddingWorker::new(embedder, config.num_workers, config.queue_capacity)?;

        tracing::info!(
            model = %model_name,
            image_dim,
            text_dim,
            normalize = config.normalize,
            "Embedding service started"
        );

        Ok(Self {
            inner: Arc::new(EmbeddingServiceInner {
                worker,
                model_name,
                image_dim,
                text_dim,
                config,
            }),
        })
    }

    /// Generate an embedding for an encoded image.
    ///
    /// # Errors
    ///
    /// Returns a decode error for invalid images, or an error if the
    /// queue is full or inference fails.
    pub async fn embed_image(&self, payload: Vec<u8>) -> Result<Vec<f32>> {
        tracing::debug!(bytes = payload.len(), "Image embedding requested");
        let started = Instant::now();
        let result = self.inner.worker.embed_image(payload).await;
        self.finish(Modality::Image, started, result)
    }

    /// Generate an embedding for a text.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is full or tokenization or inference fails.
    pub async fn embed_text(&self, text: impl Into<String>) -> Result<Vec<f32>> {
        let started = Instant::now();
        let result = self.inner.worker.embed_text(text.into()).await;
        self.finish(Modality::Text, started, result)
    }

    fn finish(
        &self,
        modality: Modality,
        started: Instant,
        result: Result<Vec<f32>>,
    ) -> Result<Vec<f32>> {
        metrics::EMBEDDING_LATENCY
            .with_label_values(&[modality.as_str()])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(mut embedding) => {
                if self.inner.config.normalize {
                    l2_normalize(&mut embedding);
                }
                metrics::EMBEDDINGS_TOTAL
                    .with_label_values(&[modality.as_str()])
                    .inc();
                Ok(embedding)
            }
            Err(e) => {
                metrics::EMBEDDING_FAILURES
                    .with_label_values(&[modality.as_str(), e.kind()])
                    .inc();
                Err(e)
            }
        }
    }

    /// Name of the loaded model.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.inner.model_name
    }

    /// Dimension of image embeddings.
    #[must_use]
    pub fn image_dim(&self) -> usize {
        self.inner.image_dim
    }

    /// Dimension of text embeddings.
    #[must_use]
    pub fn text_dim(&self) -> usize {
        self.inner.text_dim
    }

    /// Number of requests waiting for a worker.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.inner.worker.queue_depth()
    }

    /// Number of worker threads.
    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.inner.worker.num_workers()
    }
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("model", &self.inner.model_name)
            .field("image_dim", &self.inner.image_dim)
            .field("text_dim", &self.inner.text_dim)
            .field("worker", &self.inner.worker)
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::PlaceholderEmbedder;
    use crate::Config;

    fn service(normalize: bool) -> EmbeddingService {
        let config = EmbeddingConfig {
            num_workers: 2,
            queue_capacity: 16,
            normalize,
        };
        EmbeddingService::start(Arc::new(PlaceholderEmbedder::with_dims(8, 4)), config).unwrap()
    }

    #[test]
    fn test_embedding_config_from_config() {
        let config = Config {
            workers: 3,
            queue_capacity: 7,
            normalize: true,
            ..Default::default()
        };
        let emb = EmbeddingConfig::from(&config);
        assert_eq!(emb.num_workers, 3);
        assert_eq!(emb.queue_capacity, 7);
        assert!(emb.normalize);
    }

    #[tokio::test]
    async fn test_service_reports_model_info() {
        let service = service(false);
        assert_eq!(service.model_name(), "placeholder");
        assert_eq!(service.image_dim(), 8);
        assert_eq!(service.text_dim(), 4);
        assert_eq!(service.num_workers(), 2);
        assert_eq!(service.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_text_dimension_is_constant() {
        let service = service(false);
        let long = "long ".repeat(500);
        for text in ["", "a", "a photo of a cat", long.as_str()] {
            let emb = service.embed_text(text).await.unwrap();
            assert_eq!(emb.len(), 4);
        }
    }

    #[tokio::test]
    async fn test_normalize_flag() {
        let service = service(true);
        let emb = service.embed_text("unit").await.unwrap();
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_invalid_image_is_decode_error() {
        let service = service(false);
        let err = service.embed_image(b"\x00\x01\x02".to_vec()).await.unwrap_err();
        assert_eq!(err.kind(), "decode");
    }
}
