//! Configuration settings and validation.

use crate::{Error, Result};
use std::path::PathBuf;

/// Default request body limit for image uploads (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Main configuration for the embedding server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host address to bind to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Directory holding the exported CLIP model.
    pub model_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Number of embedding worker threads.
    pub workers: usize,

    /// Maximum number of requests waiting for a worker.
    pub queue_capacity: usize,

    /// Maximum accepted request body size in bytes.
    pub max_upload_bytes: usize,

    /// L2-normalize embeddings before returning them.
    pub normalize: bool,

    /// Serve deterministic placeholder vectors instead of loading the model.
    pub placeholder_model: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            model_dir: PathBuf::from("./models/clip-vit-base-patch32"),
            log_level: "info".to_string(),
            workers: std::thread::available_parallelism()
                .map(|n| n.get().min(4))
                .unwrap_or(4),
            queue_capacity: 128,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            normalize: false,
            placeholder_model: false,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::config("port cannot be 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.workers == 0 {
            return Err(Error::config("workers cannot be 0"));
        }

        if self.workers > 32 {
            return Err(Error::config("workers cannot exceed 32"));
        }

        if self.queue_capacity == 0 {
            return Err(Error::config("queue_capacity cannot be 0"));
        }

        if self.max_upload_bytes < 1024 {
            return Err(Error::config("max_upload_bytes must be at least 1024"));
        }

        if self.host.is_empty() {
            return Err(Error::config("host cannot be empty"));
        }

        Ok(())
    }

    /// Get the server address as a string.
    #[must_use]
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert!(!config.normalize);
        assert!(!config.placeholder_model);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_new() {
        let config = Config::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_port() {
        let config = Config {
            port: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = Config {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log level"));
    }

    #[test]
    fn test_validate_workers_zero() {
        let config = Config {
            workers: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn test_validate_workers_too_high() {
        let config = Config {
            workers: 100,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("32"));
    }

    #[test]
    fn test_validate_queue_capacity_zero() {
        let config = Config {
            queue_capacity: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    fn test_validate_tiny_upload_limit() {
        let config = Config {
            max_upload_bytes: 10,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_upload_bytes"));
    }

    #[test]
    fn test_validate_empty_host() {
        let config = Config {
            host: String::new(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_server_addr() {
        let config = Config {
            host: "0.0.0.0".to_string(),
            port: 9090,
            ..Default::default()
        };
        assert_eq!(config.server_addr(), "0.0.0.0:9090");
    }

    #[test]
    fn test_log_level_case_insensitive() {
        for level in ["TRACE", "Debug", "INFO", "Warn", "ERROR"] {
            let config = Config {
                log_level: level.to_string(),
                ..Default::default()
            };
            assert!(
                config.validate().is_ok(),
                "Level '{level}' should be valid (case insensitive)"
            );
        }
    }
}
