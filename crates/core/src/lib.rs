//! # Anime Gateway Core
//!
//! Shared building blocks for the Anime Gateway platform.
//!
//! This crate provides the cross-cutting concerns every Anime Gateway service
//! uses: configuration loading, error handling, and structured logging.
//!
//! ## Modules
//!
//! - `config`: Configuration loading and validation
//! - `error`: Platform error types
//! - `observability`: Structured logging initialization

pub mod config;
pub mod error;
pub mod observability;

// Re-export commonly used types
pub use config::{env_var_or, load_dotenv, parse_env_var, ConfigLoader};
pub use error::AnimeGatewayError;
pub use observability::{init_logging, LogConfig, LogFormat, ObservabilityError};

/// Result type alias for Anime Gateway operations
pub type Result<T> = std::result::Result<T, AnimeGatewayError>;
