//! Shared configuration loader module for Anime Gateway services
//!
//! This module provides a unified configuration loading system with environment
//! variable parsing, validation, and support for .env files. All configuration
//! uses the `ANIME_GATEWAY_` prefix for environment variables, with a bare-name
//! fallback where a conventional one exists (e.g. `RUST_LOG`).
//!
//! # Features
//!
//! - Environment variable parsing with typed values
//! - .env file support via dotenvy
//! - Configuration validation with clear error messages
//! - Default values for optional fields
//! - Configuration override hierarchy: defaults < .env < environment
//!
//! # Example
//!
//! ```no_run
//! use anime_gateway_core::config::{load_dotenv, ConfigLoader};
//! use anime_gateway_core::observability::LogConfig;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Load .env file (optional)
//! load_dotenv();
//!
//! // Load and validate configurations
//! let log_config = LogConfig::from_env()?;
//! log_config.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::error::AnimeGatewayError;

/// Configuration loader trait
///
/// Provides standardized methods for loading and validating configuration from
/// environment variables.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables
    ///
    /// Reads environment variables with the `ANIME_GATEWAY_` prefix and
    /// constructs a configuration instance with defaults for missing optional
    /// values.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if:
    /// - Required environment variables are missing
    /// - Environment variable values cannot be parsed
    fn from_env() -> Result<Self, AnimeGatewayError>;

    /// Validate configuration values
    ///
    /// Performs validation checks on all configuration fields to ensure they
    /// meet requirements (e.g., non-empty paths, sensible thresholds).
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if any validation check fails.
    fn validate(&self) -> Result<(), AnimeGatewayError>;
}

/// Parse an environment variable with a default value
///
/// Exported so member crates can build their own `ConfigLoader`
/// implementations on top of it.
///
/// # Errors
///
/// Returns a `ConfigurationError` if the variable is set but cannot be parsed.
pub fn parse_env_var<T>(key: &str, default: T) -> Result<T, AnimeGatewayError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.parse::<T>().map_err(|e| AnimeGatewayError::ConfigurationError {
                message: format!("Failed to parse {}: {}", key, e),
                key: Some(key.to_string()),
            })
        })
        .unwrap_or(Ok(default))
}

/// Read a string environment variable, trying `key` then `fallback`
pub fn env_var_or(key: &str, fallback: &str, default: &str) -> String {
    std::env::var(key)
        .or_else(|_| std::env::var(fallback))
        .unwrap_or_else(|_| default.to_string())
}

/// Load .env file if present
///
/// This is a convenience function that loads environment variables from a .env
/// file using dotenvy. It does not return an error if the .env file is not
/// found.
///
/// # Example
///
/// ```no_run
/// use anime_gateway_core::config::load_dotenv;
///
/// // Load .env file at the start of your application
/// load_dotenv();
/// ```
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        // Only log if it's not a "file not found" error
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Helper to set environment variable for test
    fn set_test_env(key: &str, value: &str) {
        env::set_var(key, value);
    }

    /// Helper to remove environment variable after test
    fn clear_test_env(key: &str) {
        env::remove_var(key);
    }

    #[test]
    fn test_parse_env_var_with_default() {
        let result: u32 = parse_env_var("CORE_NON_EXISTENT_VAR", 42).unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn test_parse_env_var_with_value() {
        set_test_env("CORE_TEST_PARSE_VAR", "100");
        let result: u32 = parse_env_var("CORE_TEST_PARSE_VAR", 42).unwrap();
        assert_eq!(result, 100);
        clear_test_env("CORE_TEST_PARSE_VAR");
    }

    #[test]
    fn test_parse_env_var_invalid_value() {
        set_test_env("CORE_TEST_INVALID_VAR", "not-a-number");
        let result: Result<u32, _> = parse_env_var("CORE_TEST_INVALID_VAR", 42);
        assert!(result.is_err());
        clear_test_env("CORE_TEST_INVALID_VAR");
    }

    #[test]
    fn test_env_var_or_prefers_primary() {
        set_test_env("CORE_TEST_PRIMARY", "primary");
        set_test_env("CORE_TEST_FALLBACK", "fallback");
        let value = env_var_or("CORE_TEST_PRIMARY", "CORE_TEST_FALLBACK", "default");
        assert_eq!(value, "primary");
        clear_test_env("CORE_TEST_PRIMARY");
        clear_test_env("CORE_TEST_FALLBACK");
    }

    #[test]
    fn test_env_var_or_falls_back() {
        set_test_env("CORE_TEST_FALLBACK_ONLY", "fallback");
        let value = env_var_or(
            "CORE_TEST_PRIMARY_MISSING",
            "CORE_TEST_FALLBACK_ONLY",
            "default",
        );
        assert_eq!(value, "fallback");
        clear_test_env("CORE_TEST_FALLBACK_ONLY");
    }

    #[test]
    fn test_env_var_or_default() {
        let value = env_var_or("CORE_TEST_MISSING_A", "CORE_TEST_MISSING_B", "default");
        assert_eq!(value, "default");
    }
}
