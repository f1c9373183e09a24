//! clip-embed - CLIP embedding server
//!
//! Entry point for the embedding server.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::sync::Arc;

use clap::Parser;
use clip_embed::embeddings::{
    ClipModel, Embedder, EmbeddingConfig, EmbeddingService, PlaceholderEmbedder,
};
use clip_embed::server::{init_metrics, init_tracing, App, ServerConfig};
use clip_embed::{Config, Result};

/// clip-embed - CLIP image and text embeddings over HTTP
#[derive(Parser, Debug)]
#[command(name = "clip-embed")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host address to bind to
    #[arg(long, env = "CLIP_EMBED_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "CLIP_EMBED_PORT", default_value = "8000")]
    port: u16,

    /// Directory containing vision_model.onnx, text_model.onnx and tokenizer.json
    #[arg(
        short,
        long,
        env = "CLIP_EMBED_MODEL_DIR",
        default_value = "./models/clip-vit-base-patch32"
    )]
    model_dir: std::path::PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CLIP_EMBED_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "CLIP_EMBED_LOG_JSON")]
    log_json: bool,

    /// Number of embedding worker threads [default: min(cores, 4)]
    #[arg(long, env = "CLIP_EMBED_WORKERS")]
    workers: Option<usize>,

    /// Maximum number of requests waiting for a worker
    #[arg(long, env = "CLIP_EMBED_QUEUE_CAPACITY", default_value = "128")]
    queue_capacity: usize,

    /// Maximum request body size in bytes
    #[arg(
        long,
        env = "CLIP_EMBED_MAX_UPLOAD_BYTES",
        default_value_t = clip_embed::config::DEFAULT_MAX_UPLOAD_BYTES
    )]
    max_upload_bytes: usize,

    /// L2-normalize embeddings before returning them
    #[arg(long, env = "CLIP_EMBED_NORMALIZE")]
    normalize: bool,

    /// Serve deterministic placeholder vectors instead of loading the model
    #[arg(long, env = "CLIP_EMBED_PLACEHOLDER_MODEL")]
    placeholder_model: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    tracing::info!("clip-embed v{} starting...", env!("CARGO_PKG_VERSION"));

    let defaults = Config::default();
    let config = Config {
        host: cli.host,
        port: cli.port,
        model_dir: cli.model_dir,
        log_level: cli.log_level,
        workers: cli.workers.unwrap_or(defaults.workers),
        queue_capacity: cli.queue_capacity,
        max_upload_bytes: cli.max_upload_bytes,
        normalize: cli.normalize,
        placeholder_model: cli.placeholder_model,
    };

    tracing::debug!(?config, "Configuration loaded");

    config.validate()?;

    tracing::info!(
        "Server will bind to {}, model in {:?}",
        config.server_addr(),
        config.model_dir
    );

    let embedder: Arc<dyn Embedder> = if config.placeholder_model {
        tracing::warn!("Serving placeholder embeddings; no model is loaded");
        Arc::new(PlaceholderEmbedder::new())
    } else {
        let model_dir = config.model_dir.clone();
        let model = tokio::task::spawn_blocking(move || ClipModel::load(model_dir))
            .await
            .map_err(|e| clip_embed::Error::internal(format!("model loader panicked: {e}")))??;
        Arc::new(model)
    };

    let service = EmbeddingService::start(embedder, EmbeddingConfig::from(&config))?;

    init_metrics();

    let app = App::new(ServerConfig::from(&config), service);
    app.run().await
}
