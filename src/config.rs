//! # Unified Application Configuration
//!
//! This module provides a centralized configuration system that consolidates
//! all application settings into a single, structured configuration object.
//! It supports loading from environment variables, validation, and provides
//! a clean interface for accessing configuration throughout the application.

use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use crate::ocr_config::OcrConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const MAX_CONCURRENCY_LIMIT: usize = 64;
pub const DEFAULT_ITEM_TIMEOUT_SECS: u64 = 30;
pub const MAX_ITEM_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_MAX_FILES: usize = 100;
pub const DEFAULT_MAX_BATCH_UPLOAD_BYTES: usize = 50 * 1024 * 1024; // 50MB per batch request

/// HTTP API and metrics listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Public API port
    pub port: u16,
    /// Metrics and health probe port
    pub metrics_port: u16,
    /// Whether to allow privileged ports (< 1024)
    pub allow_privileged_ports: bool,
    /// Maximum size of a whole multipart batch request
    pub max_batch_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            metrics_port: 9090,
            allow_privileged_ports: false,
            max_batch_upload_bytes: DEFAULT_MAX_BATCH_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> AppResult<()> {
        if !self.allow_privileged_ports {
            if self.port < 1024 {
                return Err(AppError::Config(format!(
                    "API port {} is privileged. Set allow_privileged_ports=true or use port >= 1024",
                    self.port
                )));
            }
            if self.metrics_port < 1024 {
                return Err(AppError::Config(format!(
                    "Metrics port {} is privileged. Set allow_privileged_ports=true or use port >= 1024",
                    self.metrics_port
                )));
            }
        }

        if self.port == self.metrics_port {
            return Err(AppError::Config(
                "API port and metrics port cannot be the same".to_string(),
            ));
        }

        if self.max_batch_upload_bytes == 0 {
            return Err(AppError::Config(
                "Max batch upload size cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Limits applied to every batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of simultaneous engine calls per batch
    pub max_concurrency: usize,
    /// Deadline for a single engine call, in seconds
    pub item_timeout_secs: u64,
    /// Optional deadline for the whole batch, in seconds
    pub batch_timeout_secs: Option<u64>,
    /// Maximum number of files accepted in one batch
    pub max_files: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            item_timeout_secs: DEFAULT_ITEM_TIMEOUT_SECS,
            batch_timeout_secs: None,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl BatchConfig {
    /// Validate batch configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.max_concurrency == 0 {
            return Err(AppError::Config("Batch max concurrency cannot be 0".to_string()));
        }
        if self.max_concurrency > MAX_CONCURRENCY_LIMIT {
            return Err(AppError::Config(format!(
                "Batch max concurrency cannot be greater than {}",
                MAX_CONCURRENCY_LIMIT
            )));
        }

        if self.item_timeout_secs == 0 {
            return Err(AppError::Config("Batch item timeout cannot be 0".to_string()));
        }
        if self.item_timeout_secs > MAX_ITEM_TIMEOUT_SECS {
            return Err(AppError::Config(format!(
                "Batch item timeout cannot be greater than {} seconds",
                MAX_ITEM_TIMEOUT_SECS
            )));
        }

        if self.batch_timeout_secs == Some(0) {
            return Err(AppError::Config("Batch timeout cannot be 0".to_string()));
        }

        if self.max_files == 0 {
            return Err(AppError::Config("Batch max files cannot be 0".to_string()));
        }

        Ok(())
    }
}

/// Where successful results are written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory receiving `ocr_<uuid>.json` files
    pub output_dir: PathBuf,
    /// Whether successful results are written at all
    pub persist_results: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            persist_results: true,
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.persist_results && self.output_dir.as_os_str().is_empty() {
            return Err(AppError::Config("Output directory cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Batch limits
    pub batch: BatchConfig,
    /// Result persistence
    pub storage: StorageConfig,
    /// OCR processing configuration
    pub ocr: OcrConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str, what: &str) -> AppResult<T> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{} must be {}", key, what)))
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v.trim().to_lowercase() == "true")
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        // Load server configuration
        config.server.port = parse_env("PORT", "8080", "a valid port number")?;
        config.server.metrics_port = parse_env("METRICS_PORT", "9090", "a valid port number")?;
        config.server.allow_privileged_ports = parse_bool_env("ALLOW_PRIVILEGED_PORTS", false);
        config.server.max_batch_upload_bytes = parse_env(
            "MAX_BATCH_UPLOAD_BYTES",
            &DEFAULT_MAX_BATCH_UPLOAD_BYTES.to_string(),
            "a valid number of bytes",
        )?;

        // Load batch configuration
        config.batch.max_concurrency = parse_env(
            "BATCH_MAX_CONCURRENCY",
            &DEFAULT_MAX_CONCURRENCY.to_string(),
            "a valid number",
        )?;
        config.batch.item_timeout_secs = parse_env(
            "BATCH_ITEM_TIMEOUT_SECS",
            &DEFAULT_ITEM_TIMEOUT_SECS.to_string(),
            "a valid number of seconds",
        )?;
        config.batch.batch_timeout_secs = match env::var("BATCH_TIMEOUT_SECS") {
            Ok(value) if !value.trim().is_empty() => Some(value.trim().parse().map_err(|_| {
                AppError::Config("BATCH_TIMEOUT_SECS must be a valid number of seconds".to_string())
            })?),
            _ => None,
        };
        config.batch.max_files = parse_env(
            "BATCH_MAX_FILES",
            &DEFAULT_MAX_FILES.to_string(),
            "a valid number",
        )?;

        // Load storage configuration
        if let Ok(dir) = env::var("OUTPUT_DIR") {
            config.storage.output_dir = PathBuf::from(dir);
        }
        config.storage.persist_results = parse_bool_env("PERSIST_RESULTS", true);

        config.ocr = OcrConfig::from_env()?;

        // The metrics listener port is owned by the server section
        config.observability = ObservabilityConfig::from_env()?;
        config.observability.metrics_port = config.server.metrics_port;

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.server.validate()?;
        self.batch.validate()?;
        self.storage.validate()?;
        self.ocr.validate()?;
        self.observability.validate()?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: port={}, metrics_port={}, max_concurrency={}, item_timeout={}s, batch_timeout={:?}, output_dir={}, ocr_languages={}, environment={}",
            self.server.port,
            self.server.metrics_port,
            self.batch.max_concurrency,
            self.batch.item_timeout_secs,
            self.batch.batch_timeout_secs,
            self.storage.output_dir.display(),
            self.ocr.languages,
            self.observability.environment
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch.max_concurrency, 4);
        assert_eq!(config.batch.item_timeout_secs, 30);
        assert_eq!(config.batch.batch_timeout_secs, None);
        assert_eq!(config.server.max_batch_upload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn test_batch_config_validation() {
        let mut config = BatchConfig::default();
        assert!(config.validate().is_ok());

        // Invalid: zero concurrency
        config.max_concurrency = 0;
        assert!(config.validate().is_err());

        // Invalid: concurrency above the ceiling
        config.max_concurrency = MAX_CONCURRENCY_LIMIT + 1;
        assert!(config.validate().is_err());
        config.max_concurrency = 4;

        // Invalid: zero and excessive item timeouts
        config.item_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.item_timeout_secs = MAX_ITEM_TIMEOUT_SECS + 1;
        assert!(config.validate().is_err());
        config.item_timeout_secs = 30;

        // Invalid: zero batch timeout
        config.batch_timeout_secs = Some(0);
        assert!(config.validate().is_err());
        config.batch_timeout_secs = Some(120);

        // Invalid: zero max files
        config.max_files = 0;
        assert!(config.validate().is_err());
        config.max_files = 10;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_validation() {
        let mut config = ServerConfig::default();

        // Valid default config
        assert!(config.validate().is_ok());

        // Invalid: same ports
        config.port = 9090;
        assert!(config.validate().is_err());
        config.port = 8080;

        // Invalid: privileged ports without permission
        config.port = 80;
        assert!(config.validate().is_err());

        // Valid: privileged ports with permission
        config.allow_privileged_ports = true;
        assert!(config.validate().is_ok());

        // Invalid: zero upload size
        config.max_batch_upload_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_config_validation() {
        let mut config = StorageConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output_dir, PathBuf::from("outputs"));

        config.output_dir = PathBuf::new();
        assert!(config.validate().is_err());

        // An empty directory is fine when nothing is persisted
        config.persist_results = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_summary_mentions_batch_limits() {
        let summary = AppConfig::default().summary();
        assert!(summary.contains("max_concurrency=4"));
        assert!(summary.contains("item_timeout=30s"));
    }
}
