//! Deterministic stand-in for the CLIP model.
//!
//! Produces unit-length pseudo-random vectors seeded from a blake3 digest of
//! the input. Image payloads are still decoded, so invalid uploads fail the
//! same way they do against the real model.

use super::preprocess;
use super::Embedder;
use crate::Result;

/// Output dimension of the placeholder (CLIP ViT-B/32 projection size).
pub const PLACEHOLDER_DIM: usize = 512;

/// Hash-seeded embedder for tests and model-less development runs.
#[derive(Debug, Clone)]
pub struct PlaceholderEmbedder {
    image_dim: usize,
    text_dim: usize,
}

impl PlaceholderEmbedder {
    /// Create a placeholder with [`PLACEHOLDER_DIM`] for both modalities.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_dims(PLACEHOLDER_DIM, PLACEHOLDER_DIM)
    }

    /// Create a placeholder with custom output dimensions.
    #[must_use]
    pub const fn with_dims(image_dim: usize, text_dim: usize) -> Self {
        Self {
            image_dim,
            text_dim,
        }
    }
}

impl Default for PlaceholderEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for PlaceholderEmbedder {
    fn name(&self) -> &str {
        "placeholder"
    }

    fn image_dim(&self) -> usize {
        self.image_dim
    }

    fn text_dim(&self) -> usize {
        self.text_dim
    }

    fn embed_image(&self, payload: &[u8]) -> Result<Vec<f32>> {
        preprocess::decode_image(payload)?;
        Ok(seeded_vector(b"image", payload, self.image_dim))
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(seeded_vector(b"text", text.as_bytes(), self.text_dim))
    }
}

#[allow(clippy::cast_precision_loss)]
fn seeded_vector(domain: &[u8], input: &[u8], dim: usize) -> Vec<f32> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(input);
    let digest = hasher.finalize();

    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest.as_bytes()[..8]);
    let mut seed = u64::from_le_bytes(seed_bytes);

    let mut embedding = Vec::with_capacity(dim);
    for _ in 0..dim {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        let value = (((seed >> 32) as f32) / (u32::MAX as f32)).mul_add(2.0, -1.0);
        embedding.push(value);
    }

    super::l2_normalize(&mut embedding);
    embedding
}
