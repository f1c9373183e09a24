//! clip-embed library
//!
//! HTTP service exposing CLIP image and text embeddings computed with
//! ONNX Runtime.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod embeddings;
pub mod error;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};
