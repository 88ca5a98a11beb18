//! # Anime Gateway Recommendation Engine
//!
//! Item-item collaborative filtering over an anime ratings dataset: loads
//! the two CSV sources, builds a Pearson-correlation similarity model,
//! persists versioned snapshots, and serves sentiment-adjusted similarity
//! queries while retraining in the background.
//!
//! The request layer and scheduler interact with one type,
//! [`RecommendationService`]; everything else is its machinery:
//!
//! - `dataset`: CSV loading and the normalized rating table
//! - `model`: pivot, Pearson pass, per-item stats, [`ModelSnapshot`]
//! - `store`: versioned all-or-nothing snapshot persistence
//! - `registry`: the atomically-swappable active snapshot
//! - `fingerprint`: source change detection by modification time
//! - `recommendation`: single-item and profile queries
//! - `service`: the facade and the background training worker

pub mod config;
pub mod dataset;
pub mod error;
pub mod fingerprint;
pub mod model;
pub mod recommendation;
pub mod registry;
pub mod service;
pub mod store;

pub use config::EngineConfig;
pub use dataset::{AnimeRecord, LoadReport, RatingRecord, RatingTable};
pub use error::{EngineError, Result};
pub use model::{ItemMeta, ModelSnapshot};
pub use recommendation::{QueryOutcome, Recommendation};
pub use registry::ModelRegistry;
pub use service::{
    CatalogItem, ModelInfo, RecommendationService, TrainOutcome, TriggerOutcome,
    DEFAULT_SEARCH_LIMIT,
};
pub use store::{ModelStore, SnapshotInfo};

#[cfg(test)]
mod tests;
