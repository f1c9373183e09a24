//! Configuration management for clip-embed.
//!
//! Values come from command-line arguments, falling back to
//! `CLIP_EMBED_*` environment variables, then defaults.

mod settings;

pub use settings::{Config, DEFAULT_MAX_UPLOAD_BYTES};
