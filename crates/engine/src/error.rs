//! Engine error taxonomy
//!
//! Structural failures surface through [`EngineError`]; soft conditions
//! (an unknown title, a training run already in flight) are ordinary return
//! values so callers can tell "try a different query" apart from "something
//! is broken".

use anime_gateway_core::AnimeGatewayError;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A source file is unreadable, mis-encoded, or missing required columns
    #[error("Failed to load source data: {message}")]
    DataLoad { message: String },

    /// The joined rating table is empty or degenerate
    #[error("Insufficient data for training: {reason}")]
    InsufficientData { reason: String },

    /// A snapshot could not be written or read back
    #[error("Model persistence failed: {message}")]
    Persistence { message: String },

    /// A query arrived before any snapshot was activated
    #[error("No recommendation model is active")]
    ModelUnavailable,

    #[error(transparent)]
    Core(#[from] AnimeGatewayError),
}

impl EngineError {
    pub fn data_load(message: impl Into<String>) -> Self {
        Self::DataLoad {
            message: message.into(),
        }
    }

    pub fn insufficient_data(reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            reason: reason.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }
}
