//! Structured logging initialization for Anime Gateway services
//!
//! Every binary and test harness calls [`init_logging`] once at startup; the
//! subscriber emits JSON in deployed environments and human-readable output
//! during development, selected via [`LogConfig`].

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use crate::config::{env_var_or, ConfigLoader};
use crate::error::AnimeGatewayError;

/// Errors raised while installing the global tracing subscriber
#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    #[error("Invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("Failed to install tracing subscriber: {0}")]
    InitFailed(String),
}

/// Output format for log records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Newline-delimited JSON, one record per line
    Json,
    /// Human-readable output for local development
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration
///
/// # Environment Variables
///
/// - `ANIME_GATEWAY_LOG_LEVEL` (optional): filter directive, `RUST_LOG`
///   syntax (default: "info"; plain `RUST_LOG` is honored as a fallback)
/// - `ANIME_GATEWAY_LOG_FORMAT` (optional): "json" or "pretty"
///   (default: "json")
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive passed to `EnvFilter`
    pub level: String,
    /// Record output format
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl ConfigLoader for LogConfig {
    fn from_env() -> Result<Self, AnimeGatewayError> {
        let level = env_var_or("ANIME_GATEWAY_LOG_LEVEL", "RUST_LOG", "info");

        let format = match std::env::var("ANIME_GATEWAY_LOG_FORMAT") {
            Ok(value) => value.parse::<LogFormat>().map_err(|message| {
                AnimeGatewayError::config("ANIME_GATEWAY_LOG_FORMAT", message)
            })?,
            Err(_) => LogConfig::default().format,
        };

        Ok(Self { level, format })
    }

    fn validate(&self) -> Result<(), AnimeGatewayError> {
        EnvFilter::try_new(&self.level).map_err(|e| {
            AnimeGatewayError::config(
                "ANIME_GATEWAY_LOG_LEVEL",
                format!("Invalid log filter '{}': {}", self.level, e),
            )
        })?;
        Ok(())
    }
}

/// Install the global tracing subscriber
///
/// Returns an error if the filter directive is invalid or if a subscriber has
/// already been installed (tests that race on initialization should ignore
/// the `InitFailed` case).
pub fn init_logging(config: &LogConfig) -> Result<(), ObservabilityError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| ObservabilityError::InvalidFilter {
        filter: config.level.clone(),
        message: e.to_string(),
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };

    result.map_err(|e| ObservabilityError::InitFailed(e.to_string()))
}
