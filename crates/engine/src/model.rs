//! Similarity model construction
//!
//! Pivots the rating table into per-column rating lists, computes the
//! item-item Pearson correlation matrix over co-raters, derives per-item
//! stats, and assembles the immutable [`ModelSnapshot`] served to queries.
//!
//! The pairwise pass is the dominant training cost (minutes on the full
//! dataset) and parallelizes across matrix rows; each task writes only its
//! own row, and a sequential mirror pass restores symmetry afterwards.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ndarray::parallel::prelude::*;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::RatingTable;
use crate::error::{EngineError, Result};

/// Per-column item metadata and statistics carried in the snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMeta {
    pub name: String,
    pub genre: String,
    pub rating_count: u32,
    /// Mean rating on the source 1-10 scale
    pub average_rating: f32,
}

/// Immutable trained model
///
/// Built once per training run, persisted by the store, and served through
/// the registry; never mutated after construction. `version` is 0 until the
/// store assigns one at persist time.
#[derive(Debug)]
pub struct ModelSnapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    /// Source mtime fingerprint captured at training start
    pub source_fingerprint: String,
    /// Items in lexicographic name order, matching the matrix axes
    pub items: Vec<ItemMeta>,
    /// Item-item Pearson correlations; NaN marks an undefined pair
    pub similarity: Array2<f32>,
    pub user_count: u64,
    pub rating_count: u64,
    /// name -> column index, rebuilt rather than serialized
    name_index: HashMap<String, usize>,
}

impl ModelSnapshot {
    pub fn new(
        version: u32,
        created_at: DateTime<Utc>,
        source_fingerprint: String,
        items: Vec<ItemMeta>,
        similarity: Array2<f32>,
        user_count: u64,
        rating_count: u64,
    ) -> Self {
        let name_index = items
            .iter()
            .enumerate()
            .map(|(idx, item)| (item.name.clone(), idx))
            .collect();
        Self {
            version,
            created_at,
            source_fingerprint,
            items,
            similarity,
            user_count,
            rating_count,
            name_index,
        }
    }

    pub fn anime_count(&self) -> usize {
        self.items.len()
    }

    /// Resolve a queried name to a column: exact match first, then the first
    /// case-insensitive substring match in column (lexicographic) order.
    pub fn resolve(&self, name: &str) -> Option<usize> {
        if let Some(&idx) = self.name_index.get(name) {
            return Some(idx);
        }
        let needle = name.to_lowercase();
        self.items
            .iter()
            .position(|item| item.name.to_lowercase().contains(&needle))
    }

    /// Defined similarity between two columns, if any
    pub fn similarity_between(&self, a: usize, b: usize) -> Option<f32> {
        let value = self.similarity[[a, b]];
        if value.is_nan() {
            None
        } else {
            Some(value)
        }
    }
}

/// Build a snapshot from a loaded rating table.
///
/// `min_co_raters` is the minimum number of users who rated both items for
/// their correlation to be defined; smaller overlaps yield NaN rather than a
/// spurious coefficient from a tiny sample.
pub fn build_model(
    table: &RatingTable,
    min_co_raters: usize,
    source_fingerprint: String,
) -> Result<ModelSnapshot> {
    if table.item_count() == 0 || table.user_count() == 0 {
        return Err(EngineError::insufficient_data(
            "cannot build a model from an empty rating table",
        ));
    }

    let started = Instant::now();

    // Row index per user, ascending user_id
    let mut user_ids: Vec<u32> = table.ratings_by_user.keys().copied().collect();
    user_ids.sort_unstable();
    let user_row: HashMap<u32, usize> = user_ids
        .iter()
        .enumerate()
        .map(|(row, &id)| (id, row))
        .collect();

    // Pivot: per column, user row -> rating. A later duplicate (user, item)
    // rating overwrites the earlier one (expected-input assumption).
    let n_items = table.item_count();
    let mut cells: Vec<HashMap<usize, f32>> = vec![HashMap::new(); n_items];
    for row in &table.rows {
        cells[row.column].insert(user_row[&row.user_id], row.rating);
    }

    // Sorted per-column rating lists give the pairwise pass a fixed
    // intersection order, which keeps rebuilds bitwise deterministic.
    let columns: Vec<Vec<(usize, f32)>> = cells
        .into_iter()
        .map(|cell| {
            let mut list: Vec<(usize, f32)> = cell.into_iter().collect();
            list.sort_unstable_by_key(|&(row, _)| row);
            list
        })
        .collect();

    debug!(
        users = user_ids.len(),
        items = n_items,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "pivot built"
    );

    let pearson_started = Instant::now();
    let mut similarity = Array2::<f32>::from_elem((n_items, n_items), f32::NAN);

    // Each task fills the upper triangle of its own row
    similarity
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            for j in i..n_items {
                row[j] = pearson(&columns[i], &columns[j], min_co_raters);
            }
        });

    // Mirror the upper triangle
    for i in 0..n_items {
        for j in (i + 1)..n_items {
            similarity[[j, i]] = similarity[[i, j]];
        }
    }

    info!(
        items = n_items,
        elapsed_ms = pearson_started.elapsed().as_millis() as u64,
        "correlation matrix computed"
    );

    let items: Vec<ItemMeta> = table
        .columns
        .iter()
        .zip(&columns)
        .map(|(meta, ratings)| {
            let count = ratings.len() as u32;
            let sum: f32 = ratings.iter().map(|&(_, r)| r).sum();
            ItemMeta {
                name: meta.name.clone(),
                genre: meta.genre.clone(),
                rating_count: count,
                average_rating: if count > 0 { sum / count as f32 } else { 0.0 },
            }
        })
        .collect();

    let rating_count: u64 = items.iter().map(|i| u64::from(i.rating_count)).sum();

    Ok(ModelSnapshot::new(
        0,
        Utc::now(),
        source_fingerprint,
        items,
        similarity,
        user_ids.len() as u64,
        rating_count,
    ))
}

/// Pearson correlation over the users present in both sorted rating lists.
///
/// Returns NaN when fewer than `min_co_raters` users rated both items or
/// either side has zero variance over the overlap; defined values are
/// clamped to [-1, 1] after the floating-point arithmetic.
fn pearson(a: &[(usize, f32)], b: &[(usize, f32)], min_co_raters: usize) -> f32 {
    let mut shared: Vec<(f32, f32)> = Vec::new();
    let (mut ia, mut ib) = (0, 0);
    while ia < a.len() && ib < b.len() {
        match a[ia].0.cmp(&b[ib].0) {
            std::cmp::Ordering::Less => ia += 1,
            std::cmp::Ordering::Greater => ib += 1,
            std::cmp::Ordering::Equal => {
                shared.push((a[ia].1, b[ib].1));
                ia += 1;
                ib += 1;
            }
        }
    }

    if shared.len() < min_co_raters {
        return f32::NAN;
    }

    let n = shared.len() as f64;
    let mean_a = shared.iter().map(|&(x, _)| f64::from(x)).sum::<f64>() / n;
    let mean_b = shared.iter().map(|&(_, y)| f64::from(y)).sum::<f64>() / n;

    let mut cov = 0.0f64;
    let mut var_a = 0.0f64;
    let mut var_b = 0.0f64;
    for &(x, y) in &shared {
        let dx = f64::from(x) - mean_a;
        let dy = f64::from(y) - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a == 0.0 || var_b == 0.0 {
        return f32::NAN;
    }

    ((cov / (var_a.sqrt() * var_b.sqrt())) as f32).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::dataset::load_rating_table;
    use std::io::Write;
    use tempfile::TempDir;

    fn table_from_csv(dir: &TempDir, anime: &str, ratings: &str) -> RatingTable {
        let anime_path = dir.path().join("anime.csv");
        let ratings_path = dir.path().join("rating.csv");
        std::fs::File::create(&anime_path)
            .unwrap()
            .write_all(anime.as_bytes())
            .unwrap();
        std::fs::File::create(&ratings_path)
            .unwrap()
            .write_all(ratings.as_bytes())
            .unwrap();
        load_rating_table(&EngineConfig {
            anime_path,
            ratings_path,
            model_dir: dir.path().join("models"),
            ..EngineConfig::default()
        })
        .unwrap()
    }

    /// Three items; A and B rated in lockstep by four users, C diverging,
    /// plus a fifth user rating only A.
    fn sample_table(dir: &TempDir) -> RatingTable {
        let anime = "anime_id,name,genre,members\n\
            1,Alpha,Action,1000\n\
            2,Beta,Drama,2000\n\
            3,Gamma,Comedy,3000\n";
        let ratings = "user_id,anime_id,rating\n\
            1,1,10\n1,2,9\n1,3,2\n\
            2,1,8\n2,2,7\n2,3,4\n\
            3,1,6\n3,2,5\n3,3,6\n\
            4,1,4\n4,2,3\n4,3,8\n\
            5,1,7\n";
        table_from_csv(dir, anime, ratings)
    }

    #[test]
    fn test_perfect_positive_and_negative_correlation() {
        let dir = TempDir::new().unwrap();
        let table = sample_table(&dir);
        let model = build_model(&table, 2, "fp".to_string()).unwrap();

        let a = model.resolve("Alpha").unwrap();
        let b = model.resolve("Beta").unwrap();
        let c = model.resolve("Gamma").unwrap();

        // A and B move in lockstep; C moves against both
        let sim_ab = model.similarity_between(a, b).unwrap();
        assert!((sim_ab - 1.0).abs() < 1e-5, "sim_ab = {sim_ab}");
        let sim_ac = model.similarity_between(a, c).unwrap();
        assert!(sim_ac < -0.9, "sim_ac = {sim_ac}");
    }

    #[test]
    fn test_symmetry() {
        let dir = TempDir::new().unwrap();
        let table = sample_table(&dir);
        let model = build_model(&table, 2, "fp".to_string()).unwrap();

        let n = model.anime_count();
        for i in 0..n {
            for j in 0..n {
                let ij = model.similarity[[i, j]];
                let ji = model.similarity[[j, i]];
                assert!(
                    (ij.is_nan() && ji.is_nan()) || ij == ji,
                    "asymmetric at ({i},{j}): {ij} vs {ji}"
                );
            }
        }
    }

    #[test]
    fn test_min_co_raters_marks_pair_undefined() {
        let dir = TempDir::new().unwrap();
        let table = sample_table(&dir);
        // A-B and A-C share 4 raters each; a threshold of 5 undefines them
        let model = build_model(&table, 5, "fp".to_string()).unwrap();
        let a = model.resolve("Alpha").unwrap();
        let b = model.resolve("Beta").unwrap();
        assert!(model.similarity_between(a, b).is_none());
    }

    #[test]
    fn test_zero_variance_is_undefined() {
        let dir = TempDir::new().unwrap();
        let anime = "anime_id,name,genre,members\n\
            1,Alpha,Action,1000\n\
            2,Beta,Drama,2000\n";
        // Every co-rater gave Beta the same rating
        let ratings = "user_id,anime_id,rating\n\
            1,1,10\n1,2,7\n\
            2,1,8\n2,2,7\n\
            3,1,6\n3,2,7\n";
        let table = table_from_csv(&dir, anime, ratings);
        let model = build_model(&table, 2, "fp".to_string()).unwrap();
        let a = model.resolve("Alpha").unwrap();
        let b = model.resolve("Beta").unwrap();
        assert!(model.similarity_between(a, b).is_none());
    }

    #[test]
    fn test_stats() {
        let dir = TempDir::new().unwrap();
        let table = sample_table(&dir);
        let model = build_model(&table, 2, "fp".to_string()).unwrap();

        let a = model.resolve("Alpha").unwrap();
        assert_eq!(model.items[a].rating_count, 5);
        assert!((model.items[a].average_rating - 7.0).abs() < 1e-6);
        assert_eq!(model.user_count, 5);
        assert_eq!(model.rating_count, 13);
    }

    #[test]
    fn test_determinism() {
        let dir = TempDir::new().unwrap();
        let table = sample_table(&dir);
        let first = build_model(&table, 2, "fp".to_string()).unwrap();
        let second = build_model(&table, 2, "fp".to_string()).unwrap();

        let n = first.anime_count();
        for i in 0..n {
            for j in 0..n {
                let x = first.similarity[[i, j]];
                let y = second.similarity[[i, j]];
                assert!(x.to_bits() == y.to_bits(), "differs at ({i},{j})");
            }
        }
        for (a, b) in first.items.iter().zip(&second.items) {
            assert_eq!(a.rating_count, b.rating_count);
            assert_eq!(a.average_rating.to_bits(), b.average_rating.to_bits());
        }
    }

    #[test]
    fn test_duplicate_rating_overwrites() {
        let dir = TempDir::new().unwrap();
        let anime = "anime_id,name,genre,members\n1,Alpha,Action,1000\n";
        let ratings = "user_id,anime_id,rating\n\
            1,1,3\n\
            1,1,9\n";
        let table = table_from_csv(&dir, anime, ratings);
        let model = build_model(&table, 2, "fp".to_string()).unwrap();
        let a = model.resolve("Alpha").unwrap();
        // The later rating wins and the pivot holds one cell for the pair
        assert_eq!(model.items[a].rating_count, 1);
        assert!((model.items[a].average_rating - 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_resolve_substring_fallback() {
        let dir = TempDir::new().unwrap();
        let table = sample_table(&dir);
        let model = build_model(&table, 2, "fp".to_string()).unwrap();
        assert_eq!(model.resolve("Alpha"), model.resolve("alph"));
        assert!(model.resolve("Delta").is_none());
        // Substring falls back to the first match in column order
        assert_eq!(model.resolve("a"), Some(0));
    }
}
