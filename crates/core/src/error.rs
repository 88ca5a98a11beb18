//! Error types shared across Anime Gateway crates

/// Platform-wide error type for cross-cutting concerns
///
/// Service crates define their own domain error enums and convert from this
/// type where they consume shared functionality (configuration, logging).
#[derive(Debug, thiserror::Error)]
pub enum AnimeGatewayError {
    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        /// Environment variable the error relates to, when known
        key: Option<String>,
    },
}

impl AnimeGatewayError {
    /// Configuration error tied to a specific environment variable
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
