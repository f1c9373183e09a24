//! Error types and Result aliases for clip-embed.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for clip-embed operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Embedding generation error.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Server/API error.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Embedding-specific errors.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Payload is not a decodable image.
    #[error("invalid image: {0}")]
    Decode(String),

    /// ONNX runtime error.
    #[error("ONNX runtime error: {0}")]
    Runtime(String),

    /// Model loading error.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Tokenization error.
    #[error("tokenization error: {0}")]
    Tokenization(String),

    /// Worker pool error.
    #[error("worker pool error: {0}")]
    WorkerPool(String),

    /// Job queue is full.
    #[error("embedding queue is full ({capacity} pending requests)")]
    Busy { capacity: usize },
}

/// Server/API errors.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {address}: {reason}")]
    BindFailed { address: String, reason: String },

    /// Malformed request.
    #[error("request error: {0}")]
    Request(String),

    /// Required request field absent.
    #[error("missing field '{0}'")]
    MissingField(&'static str),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short machine-readable label, used for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Embedding(e) => e.kind(),
            Self::Server(ServerError::MissingField(_) | ServerError::Request(_)) => "bad_request",
            Self::Server(ServerError::BindFailed { .. }) => "bind",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

impl EmbeddingError {
    /// Short machine-readable label, used for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Runtime(_) => "runtime",
            Self::ModelLoad(_) => "model_load",
            Self::Tokenization(_) => "tokenization",
            Self::WorkerPool(_) => "worker_pool",
            Self::Busy { .. } => "busy",
        }
    }
}
