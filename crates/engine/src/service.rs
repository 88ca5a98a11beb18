//! Recommendation service facade
//!
//! The one type the request layer and scheduler talk to. Owns the
//! configuration, the model store, the registry, and the training flag;
//! queries read the active snapshot through the registry while training
//! runs the load -> build -> persist -> activate pipeline on a blocking
//! worker under an exclusive compare-and-set flag.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::dataset::load_rating_table;
use crate::error::{EngineError, Result};
use crate::fingerprint::{has_changed, source_fingerprint};
use crate::model::build_model;
use crate::recommendation::{recommend, recommend_for_profile, QueryOutcome};
use crate::registry::ModelRegistry;
use crate::store::{ModelStore, SnapshotInfo};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// One catalog entry served from the active snapshot's item axis
#[derive(Debug, Clone, Serialize)]
pub struct CatalogItem {
    pub name: String,
    pub genre: String,
}

/// Active model metadata for operators and the request layer
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub version: u32,
    pub activated_at: DateTime<Utc>,
    pub anime_count: usize,
    pub user_count: u64,
    pub rating_count: u64,
    pub data_changed: bool,
    pub training_in_progress: bool,
}

/// Result of an awaited training run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrainOutcome {
    Completed { version: u32 },
    /// Another run holds the flag; this trigger was a no-op
    AlreadyInProgress,
}

/// Result of a fire-and-forget trigger
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Started,
    AlreadyInProgress,
}

/// Releases the training flag on every exit path, including panics
/// surfacing as join errors.
struct TrainingGuard(Arc<AtomicBool>);

impl Drop for TrainingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Recommendation engine facade
#[derive(Clone)]
pub struct RecommendationService {
    config: EngineConfig,
    store: Arc<ModelStore>,
    registry: Arc<ModelRegistry>,
    training: Arc<AtomicBool>,
}

impl RecommendationService {
    /// Construct the service and bootstrap the registry from the highest
    /// stored version. With an empty store the service starts in the
    /// explicit "no model" state; queries fail with
    /// [`EngineError::ModelUnavailable`] until a training completes.
    pub async fn new(config: EngineConfig) -> Result<Self> {
        use anime_gateway_core::ConfigLoader as _;
        config.validate()?;

        let store = Arc::new(ModelStore::new(&config.model_dir)?);
        let registry = Arc::new(ModelRegistry::new());

        let latest = store.latest_version()?;
        if latest > 0 {
            let snapshot = store.load(latest)?;
            registry.activate(snapshot).await;
            info!(version = latest, "bootstrapped from stored model");
        } else {
            warn!(
                model_dir = %config.model_dir.display(),
                "no stored model found; queries unavailable until first training"
            );
        }

        Ok(Self {
            config,
            store,
            registry,
            training: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Single-item similarity query; `user_rating` is stars on the 0-5
    /// scale, `None` = unrated
    pub async fn recommend(
        &self,
        name: &str,
        user_rating: Option<f32>,
        limit: usize,
    ) -> Result<QueryOutcome> {
        let snapshot = self.registry.get_active().await?;
        Ok(recommend(
            &snapshot,
            name,
            user_rating,
            limit,
            self.config.min_popularity,
        ))
    }

    /// Profile query over a map of title -> user stars
    pub async fn recommend_for_profile(
        &self,
        ratings: &HashMap<String, f32>,
        limit: usize,
    ) -> Result<QueryOutcome> {
        let snapshot = self.registry.get_active().await?;
        Ok(recommend_for_profile(&snapshot, ratings, limit))
    }

    /// Every rated item of the active snapshot, sorted by name
    pub async fn get_all_items(&self) -> Result<Vec<CatalogItem>> {
        let snapshot = self.registry.get_active().await?;
        // Items are already in lexicographic column order
        Ok(snapshot
            .items
            .iter()
            .map(|item| CatalogItem {
                name: item.name.clone(),
                genre: item.genre.clone(),
            })
            .collect())
    }

    /// Case-insensitive substring search over item names, first `limit`
    /// matches in column order
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogItem>> {
        let snapshot = self.registry.get_active().await?;
        let needle = query.to_lowercase();
        Ok(snapshot
            .items
            .iter()
            .filter(|item| item.name.to_lowercase().contains(&needle))
            .take(limit)
            .map(|item| CatalogItem {
                name: item.name.clone(),
                genre: item.genre.clone(),
            })
            .collect())
    }

    /// Metadata for the active model.
    ///
    /// Built from one registry read, so an activation racing this call
    /// never pairs one snapshot's counts with another's activation time
    /// or fingerprint.
    pub async fn get_model_info(&self) -> Result<ModelInfo> {
        let active = self.registry.get_active_model().await?;
        let snapshot = &active.snapshot;
        let current = source_fingerprint(&self.config.anime_path, &self.config.ratings_path)?;
        Ok(ModelInfo {
            version: snapshot.version,
            activated_at: active.activated_at,
            anime_count: snapshot.anime_count(),
            user_count: snapshot.user_count,
            rating_count: snapshot.rating_count,
            data_changed: has_changed(&current, &snapshot.source_fingerprint),
            training_in_progress: self.is_training(),
        })
    }

    pub fn list_versions(&self) -> Result<Vec<SnapshotInfo>> {
        self.store.list_versions()
    }

    /// Whether the sources have changed since the active snapshot was
    /// trained. With no active model the answer is `true`: data is newer
    /// than nothing, so a first load never hides a pending retrain.
    pub async fn has_data_changed(&self) -> Result<bool> {
        let current = source_fingerprint(&self.config.anime_path, &self.config.ratings_path)?;
        match self.registry.get_active().await {
            Ok(snapshot) => Ok(has_changed(&current, &snapshot.source_fingerprint)),
            Err(EngineError::ModelUnavailable) => Ok(true),
            Err(e) => Err(e),
        }
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn training_flag(&self) -> &AtomicBool {
        &self.training
    }

    /// Run one training cycle to completion.
    ///
    /// At most one run holds the flag at a time; losing the
    /// compare-and-set race is the soft [`TrainOutcome::AlreadyInProgress`]
    /// outcome, never a queued request. Any failure leaves the active model
    /// and the version sequence untouched.
    pub async fn train(&self) -> Result<TrainOutcome> {
        if self
            .training
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(TrainOutcome::AlreadyInProgress);
        }
        let _guard = TrainingGuard(Arc::clone(&self.training));

        info!("training started");
        let config = self.config.clone();
        let store = Arc::clone(&self.store);

        // The Pearson pass takes minutes on the full dataset; keep it off
        // the async workers
        let persisted = tokio::task::spawn_blocking(move || {
            let fingerprint = source_fingerprint(&config.anime_path, &config.ratings_path)?;
            let table = load_rating_table(&config)?;
            let snapshot = build_model(&table, config.min_co_raters, fingerprint)?;
            store.persist(snapshot)
        })
        .await
        .map_err(|e| EngineError::persistence(format!("training worker failed: {e}")))??;

        let version = persisted.version;
        self.registry.activate(persisted).await;
        info!(version, "training completed");

        Ok(TrainOutcome::Completed { version })
    }

    /// Fire-and-forget trigger for the scheduler; the run's outcome is
    /// logged rather than returned.
    pub fn trigger_training(&self) -> TriggerOutcome {
        if self.is_training() {
            return TriggerOutcome::AlreadyInProgress;
        }
        let service = self.clone();
        tokio::spawn(async move {
            match service.train().await {
                Ok(TrainOutcome::Completed { version }) => {
                    info!(version, "background training completed");
                }
                // The CAS in train() settles the race this pre-check missed
                Ok(TrainOutcome::AlreadyInProgress) => {}
                Err(e) => error!(error = %e, "background training failed"),
            }
        });
        TriggerOutcome::Started
    }
}
