//! White-box test suite
//!
//! Shared fixtures plus the query and service state tests that need access
//! to crate internals.


use chrono::Utc;
use ndarray::Array2;

use crate::model::{ItemMeta, ModelSnapshot};

/// Build a snapshot directly from a similarity matrix and per-item
/// (name, genre, rating_count, average_rating) rows, bypassing training.
pub(crate) fn snapshot_from_parts(
    items: &[(&str, &str, u32, f32)],
    similarity: Vec<f32>,
) -> ModelSnapshot {
    let n = items.len();
    let items = items
        .iter()
        .map(|&(name, genre, rating_count, average_rating)| ItemMeta {
            name: name.to_string(),
            genre: genre.to_string(),
            rating_count,
            average_rating,
        })
        .collect();
    ModelSnapshot::new(
        1,
        Utc::now(),
        "test-fingerprint".to_string(),
        items,
        Array2::from_shape_vec((n, n), similarity).unwrap(),
        100,
        100,
    )
}
