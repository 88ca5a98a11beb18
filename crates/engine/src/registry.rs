//! Active model registry
//!
//! Holds the one snapshot currently serving queries behind an
//! atomically-swappable reference. Readers take a cheap read lock, clone the
//! `Arc`, and compute against an immutable snapshot; an activation mid-query
//! swaps the slot without touching the snapshot a reader already holds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::model::ModelSnapshot;

/// The snapshot currently serving queries
#[derive(Debug, Clone)]
pub struct ActiveModel {
    pub snapshot: Arc<ModelSnapshot>,
    pub activated_at: DateTime<Utc>,
}

/// Single-slot registry for the active snapshot
#[derive(Debug, Default)]
pub struct ModelRegistry {
    active: RwLock<Option<ActiveModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active snapshot, or [`EngineError::ModelUnavailable`] if no
    /// training has ever completed.
    pub async fn get_active(&self) -> Result<Arc<ModelSnapshot>> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.snapshot))
            .ok_or(EngineError::ModelUnavailable)
    }

    /// Replace the active snapshot. Never fails for a well-formed snapshot;
    /// validation happens upstream in the builder.
    pub async fn activate(&self, snapshot: ModelSnapshot) -> Arc<ModelSnapshot> {
        let snapshot = Arc::new(snapshot);
        let active = ActiveModel {
            snapshot: Arc::clone(&snapshot),
            activated_at: Utc::now(),
        };
        let previous = self.active.write().await.replace(active);
        info!(
            version = snapshot.version,
            previous_version = previous.map(|p| p.snapshot.version),
            "model activated"
        );
        snapshot
    }

    /// The whole active entry in one read, for callers that need the
    /// snapshot and its activation time to agree with each other.
    pub async fn get_active_model(&self) -> Result<ActiveModel> {
        self.active
            .read()
            .await
            .clone()
            .ok_or(EngineError::ModelUnavailable)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemMeta;
    use ndarray::Array2;

    fn snapshot(version: u32) -> ModelSnapshot {
        ModelSnapshot::new(
            version,
            Utc::now(),
            "fp".to_string(),
            vec![ItemMeta {
                name: "Alpha".to_string(),
                genre: "Action".to_string(),
                rating_count: 10,
                average_rating: 8.0,
            }],
            Array2::from_elem((1, 1), 1.0),
            10,
            10,
        )
    }

    #[tokio::test]
    async fn test_uninitialized_registry_is_model_unavailable() {
        let registry = ModelRegistry::new();
        assert!(matches!(
            registry.get_active().await,
            Err(EngineError::ModelUnavailable)
        ));
        assert!(matches!(
            registry.get_active_model().await,
            Err(EngineError::ModelUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_activate_and_read() {
        let registry = ModelRegistry::new();
        registry.activate(snapshot(1)).await;
        let active = registry.get_active().await.unwrap();
        assert_eq!(active.version, 1);
    }

    #[tokio::test]
    async fn test_active_model_is_one_consistent_read() {
        let registry = ModelRegistry::new();
        registry.activate(snapshot(1)).await;
        let first = registry.get_active_model().await.unwrap();
        registry.activate(snapshot(2)).await;
        let second = registry.get_active_model().await.unwrap();

        // Each read carries a snapshot/activation-time pair that belongs
        // together; the held copy is untouched by the later swap
        assert_eq!(first.snapshot.version, 1);
        assert_eq!(second.snapshot.version, 2);
        assert!(second.activated_at >= first.activated_at);
    }

    #[tokio::test]
    async fn test_reader_keeps_old_snapshot_across_swap() {
        let registry = ModelRegistry::new();
        registry.activate(snapshot(1)).await;

        // A query in flight holds its own reference
        let held = registry.get_active().await.unwrap();
        registry.activate(snapshot(2)).await;

        assert_eq!(held.version, 1);
        assert_eq!(registry.get_active().await.unwrap().version, 2);
    }
}
