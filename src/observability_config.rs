//! # Observability Settings
//!
//! Logging, metrics and trace export knobs read from the environment.
//! `ENVIRONMENT=development` switches the default log output to the
//! human-readable format; everything else logs JSON unless `LOG_FORMAT`
//! says otherwise.

use std::env;
use std::fmt;
use std::str::FromStr;

use crate::errors::{AppError, AppResult};

pub const SERVICE_NAME: &str = "ocr-batch";

const DEVELOPMENT: &str = "development";

/// Log line rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// Format used when `LOG_FORMAT` is not set
    pub fn default_for(environment: &str) -> Self {
        if environment == DEVELOPMENT {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(AppError::Config(format!(
                "Invalid log format: {other} (expected json or pretty)"
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Deployment name, exported as the `environment` resource tag
    pub environment: String,
    /// OTLP collector; trace export is off when unset
    pub otlp_endpoint: Option<String>,
    /// Port of the metrics and health listener
    pub metrics_port: u16,
    /// Log level for this crate's targets
    pub log_level: String,
    pub log_format: LogFormat,
    /// Ratio-based trace sampling; `None` keeps every trace
    pub trace_sampling_ratio: Option<f64>,
    /// Whether to install the Prometheus recorder
    pub enable_metrics_export: bool,
    /// Resource attributes attached to exported traces
    pub tags: Vec<(String, String)>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: DEVELOPMENT.to_string(),
            otlp_endpoint: None,
            metrics_port: 9090,
            log_level: "info".to_string(),
            log_format: LogFormat::default_for(DEVELOPMENT),
            trace_sampling_ratio: None,
            enable_metrics_export: true,
            tags: Vec::new(),
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_flag(key: &str, default: bool) -> AppResult<bool> {
    match env_value(key) {
        Some(value) => value
            .to_lowercase()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} must be true or false"))),
        None => Ok(default),
    }
}

impl ObservabilityConfig {
    /// Load settings from the environment
    ///
    /// The metrics port is left at its default; `AppConfig` copies it from
    /// the server section.
    pub fn from_env() -> AppResult<Self> {
        let environment = env_value("ENVIRONMENT").unwrap_or_else(|| DEVELOPMENT.to_string());

        let log_format = match env_value("LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => LogFormat::default_for(&environment),
        };

        let trace_sampling_ratio = if env_flag("ENABLE_TRACE_SAMPLING", false)? {
            let ratio = match env_value("TRACE_SAMPLING_RATIO") {
                Some(value) => value.parse().map_err(|_| {
                    AppError::Config("TRACE_SAMPLING_RATIO must be a number".to_string())
                })?,
                None => 1.0,
            };
            Some(ratio)
        } else {
            None
        };

        let mut tags = env_value("OBSERVABILITY_TAGS")
            .map(|tags| parse_tags(&tags))
            .unwrap_or_default();
        tags.extend(default_tags(&environment));

        Ok(Self {
            otlp_endpoint: env_value("OTLP_ENDPOINT"),
            log_level: env_value("OBSERVABILITY_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            trace_sampling_ratio,
            enable_metrics_export: env_flag("ENABLE_METRICS_EXPORT", true)?,
            tags,
            environment,
            ..Default::default()
        })
    }

    pub fn validate(&self) -> AppResult<()> {
        if let Some(endpoint) = &self.otlp_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "Invalid OTLP endpoint format: {endpoint}"
                )));
            }
        }

        if let Some(ratio) = self.trace_sampling_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(AppError::Config(format!(
                    "Invalid trace sampling ratio: {ratio}"
                )));
            }
        }

        if self.metrics_port == 0 {
            return Err(AppError::Config("Metrics port cannot be 0".to_string()));
        }

        Ok(())
    }
}

/// Tags every deployment exports, derived from the process environment
fn default_tags(environment: &str) -> Vec<(String, String)> {
    let mut tags = vec![("environment".to_string(), environment.to_string())];
    for (key, var) in [("version", "SERVICE_VERSION"), ("hostname", "HOSTNAME")] {
        if let Some(value) = env_value(var) {
            tags.push((key.to_string(), value));
        }
    }
    tags
}

/// `key1=value1,key2=value2`; pairs without a key or `=` are skipped
fn parse_tags(tags_str: &str) -> Vec<(String, String)> {
    tags_str
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}
