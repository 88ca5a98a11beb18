//! Engine configuration

use std::path::PathBuf;

use anime_gateway_core::{parse_env_var, AnimeGatewayError, ConfigLoader};

/// Recommendation engine configuration
///
/// # Environment Variables
///
/// - `ANIME_GATEWAY_ENGINE_ANIME_PATH` (optional): anime metadata CSV
///   (default: "data/anime.csv")
/// - `ANIME_GATEWAY_ENGINE_RATINGS_PATH` (optional): ratings CSV
///   (default: "data/rating.csv")
/// - `ANIME_GATEWAY_ENGINE_MODEL_DIR` (optional): snapshot directory
///   (default: "models")
/// - `ANIME_GATEWAY_ENGINE_MIN_CO_RATERS` (optional): minimum users who rated
///   both items for a correlation to be defined (default: 100)
/// - `ANIME_GATEWAY_ENGINE_MIN_POPULARITY` (optional): minimum rating count
///   for an item to be recommendable in single-item queries (default: 100)
/// - `ANIME_GATEWAY_ENGINE_MIN_USER_RATINGS` (optional): drop users with
///   fewer ratings before training, 0 disables (default: 0)
/// - `ANIME_GATEWAY_ENGINE_MIN_ITEM_RATINGS` (optional): drop items with
///   fewer ratings before training, 0 disables (default: 0)
///
/// # Example
///
/// ```bash
/// export ANIME_GATEWAY_ENGINE_ANIME_PATH="/srv/data/anime.csv"
/// export ANIME_GATEWAY_ENGINE_RATINGS_PATH="/srv/data/rating.csv"
/// export ANIME_GATEWAY_ENGINE_MODEL_DIR="/srv/models"
/// export ANIME_GATEWAY_ENGINE_MIN_CO_RATERS="50"
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Anime metadata CSV path
    pub anime_path: PathBuf,
    /// Ratings CSV path
    pub ratings_path: PathBuf,
    /// Directory holding versioned model snapshots
    pub model_dir: PathBuf,
    /// Minimum co-raters for a defined correlation
    pub min_co_raters: usize,
    /// Popularity floor for single-item recommendations
    pub min_popularity: u32,
    /// Pre-training user pruning threshold (0 = disabled)
    pub min_user_ratings: usize,
    /// Pre-training item pruning threshold (0 = disabled)
    pub min_item_ratings: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            anime_path: PathBuf::from("data/anime.csv"),
            ratings_path: PathBuf::from("data/rating.csv"),
            model_dir: PathBuf::from("models"),
            min_co_raters: 100,
            min_popularity: 100,
            min_user_ratings: 0,
            min_item_ratings: 0,
        }
    }
}

impl ConfigLoader for EngineConfig {
    fn from_env() -> Result<Self, AnimeGatewayError> {
        let defaults = EngineConfig::default();

        let anime_path = std::env::var("ANIME_GATEWAY_ENGINE_ANIME_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.anime_path);

        let ratings_path = std::env::var("ANIME_GATEWAY_ENGINE_RATINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.ratings_path);

        let model_dir = std::env::var("ANIME_GATEWAY_ENGINE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_dir);

        let min_co_raters = parse_env_var(
            "ANIME_GATEWAY_ENGINE_MIN_CO_RATERS",
            defaults.min_co_raters,
        )?;

        let min_popularity = parse_env_var(
            "ANIME_GATEWAY_ENGINE_MIN_POPULARITY",
            defaults.min_popularity,
        )?;

        let min_user_ratings = parse_env_var(
            "ANIME_GATEWAY_ENGINE_MIN_USER_RATINGS",
            defaults.min_user_ratings,
        )?;

        let min_item_ratings = parse_env_var(
            "ANIME_GATEWAY_ENGINE_MIN_ITEM_RATINGS",
            defaults.min_item_ratings,
        )?;

        Ok(Self {
            anime_path,
            ratings_path,
            model_dir,
            min_co_raters,
            min_popularity,
            min_user_ratings,
            min_item_ratings,
        })
    }

    fn validate(&self) -> Result<(), AnimeGatewayError> {
        if self.anime_path.as_os_str().is_empty() {
            return Err(AnimeGatewayError::config(
                "ANIME_GATEWAY_ENGINE_ANIME_PATH",
                "anime_path must not be empty",
            ));
        }

        if self.ratings_path.as_os_str().is_empty() {
            return Err(AnimeGatewayError::config(
                "ANIME_GATEWAY_ENGINE_RATINGS_PATH",
                "ratings_path must not be empty",
            ));
        }

        if self.model_dir.as_os_str().is_empty() {
            return Err(AnimeGatewayError::config(
                "ANIME_GATEWAY_ENGINE_MODEL_DIR",
                "model_dir must not be empty",
            ));
        }

        // Pearson correlation needs at least two co-raters
        if self.min_co_raters < 2 {
            return Err(AnimeGatewayError::config(
                "ANIME_GATEWAY_ENGINE_MIN_CO_RATERS",
                format!(
                    "min_co_raters must be at least 2, got {}",
                    self.min_co_raters
                ),
            ));
        }

        Ok(())
    }
}
