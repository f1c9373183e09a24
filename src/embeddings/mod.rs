//! CLIP embedding generation.
//!
//! This module provides:
//! - The [`Embedder`] seam between the HTTP layer and the model
//! - ONNX Runtime integration for the CLIP vision and text towers
//! - Dedicated thread pool for inference
//! - Async API using channels for non-blocking operation

mod model;
mod placeholder;
pub mod preprocess;
mod service;
mod worker;

pub use model::{
    load_tokenizer, ClipModel, ModelFiles, MAX_TEXT_TOKENS, TEXT_MODEL_FILE, TOKENIZER_FILE,
    VISION_MODEL_FILE,
};
pub use placeholder::{PlaceholderEmbedder, PLACEHOLDER_DIM};
pub use service::{EmbeddingConfig, EmbeddingService};
pub use worker::EmbeddingWorker;

use crate::Result;

/// Input kind of an embedding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Image,
    Text,
}

impl Modality {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A multimodal embedding model.
///
/// Implementations are shared across worker threads and called with
/// blocking semantics; they must not hold per-request state.
pub trait Embedder: Send + Sync {
    /// Identifier reported by health and status endpoints.
    fn name(&self) -> &str;

    /// Length of vectors returned by [`Embedder::embed_image`].
    fn image_dim(&self) -> usize;

    /// Length of vectors returned by [`Embedder::embed_text`].
    fn text_dim(&self) -> usize;

    /// Embed an encoded image payload.
    ///
    /// # Errors
    ///
    /// Returns a decode error for invalid images and a runtime error if
    /// inference fails.
    fn embed_image(&self, payload: &[u8]) -> Result<Vec<f32>>;

    /// Embed a text string.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization or inference fails.
    fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
}

/// L2-normalize a vector in place. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0; 4];
        l2_normalize(&mut v);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_modality_labels() {
        assert_eq!(Modality::Image.as_str(), "image");
        assert_eq!(Modality::Text.to_string(), "text");
    }
}
