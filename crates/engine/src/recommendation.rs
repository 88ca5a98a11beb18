//! Similarity queries with rating-aware re-ranking
//!
//! Both query modes run against one snapshot reference fetched before any
//! computation, so an activation mid-query never tears a result. Undefined
//! (NaN) similarities are never candidates.
//!
//! Query ratings are user stars on a 0-5 scale (half steps allowed); item
//! averages are on the source 1-10 scale, hence the `average / 10`
//! normalization inside the ranking blends.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::model::ModelSnapshot;

/// Liked band (stars >= 4): similarity dominates, average rating breaks the
/// long tail apart
const LIKED_SIMILARITY_WEIGHT: f32 = 0.7;
const LIKED_AVERAGE_WEIGHT: f32 = 0.3;

/// Disliked band (stars <= 2): only deliberately dissimilar items qualify
const DISLIKED_SIMILARITY_CEILING: f32 = 0.3;
const DISLIKED_DISTANCE_WEIGHT: f32 = 0.5;
const DISLIKED_AVERAGE_WEIGHT: f32 = 0.5;

/// Neutral band: moderately related items only
const NEUTRAL_SIMILARITY_FLOOR: f32 = 0.2;
const NEUTRAL_SIMILARITY_CEILING: f32 = 0.6;
const NEUTRAL_SIMILARITY_WEIGHT: f32 = 0.5;
const NEUTRAL_AVERAGE_WEIGHT: f32 = 0.5;

/// Profile weighting for a neutral rating
const NEUTRAL_PROFILE_WEIGHT: f32 = 0.5;

/// One recommended title
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub title: String,
    /// The item's average rating on the source 1-10 scale
    pub score: f32,
    pub genre: String,
    /// Raw similarity (single-item mode) or the normalized accumulated
    /// profile score (profile mode)
    pub correlation: f32,
}

/// Soft query result: an unknown title is an ordinary outcome, not an error
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QueryOutcome {
    Found {
        /// Resolved canonical title(s) the query matched
        resolved: Vec<String>,
        recommendations: Vec<Recommendation>,
    },
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RatingBand {
    Liked,
    Disliked,
    Neutral,
}

impl RatingBand {
    fn classify(rating: Option<f32>) -> Self {
        match rating {
            Some(r) if r >= 4.0 => Self::Liked,
            Some(r) if r <= 2.0 => Self::Disliked,
            _ => Self::Neutral,
        }
    }
}

/// Single-item query: rank items similar (or deliberately dissimilar) to one
/// title according to the user's expressed sentiment about it.
pub fn recommend(
    snapshot: &ModelSnapshot,
    name: &str,
    user_rating: Option<f32>,
    limit: usize,
    min_popularity: u32,
) -> QueryOutcome {
    let Some(queried) = snapshot.resolve(name) else {
        debug!(query = name, "single-item query resolved to nothing");
        return QueryOutcome::NotFound;
    };

    let band = RatingBand::classify(user_rating);
    let mut ranked: Vec<(usize, f32, f32)> = Vec::new();

    for candidate in 0..snapshot.anime_count() {
        if candidate == queried {
            continue;
        }
        let Some(similarity) = snapshot.similarity_between(queried, candidate) else {
            continue;
        };
        let item = &snapshot.items[candidate];
        if item.rating_count < min_popularity {
            continue;
        }

        let normalized_average = item.average_rating / 10.0;
        let score = match band {
            RatingBand::Liked => {
                LIKED_SIMILARITY_WEIGHT * similarity + LIKED_AVERAGE_WEIGHT * normalized_average
            }
            RatingBand::Disliked => {
                if similarity >= DISLIKED_SIMILARITY_CEILING {
                    continue;
                }
                DISLIKED_DISTANCE_WEIGHT * (1.0 - similarity.abs())
                    + DISLIKED_AVERAGE_WEIGHT * normalized_average
            }
            RatingBand::Neutral => {
                if similarity <= NEUTRAL_SIMILARITY_FLOOR
                    || similarity >= NEUTRAL_SIMILARITY_CEILING
                {
                    continue;
                }
                NEUTRAL_SIMILARITY_WEIGHT * similarity
                    + NEUTRAL_AVERAGE_WEIGHT * normalized_average
            }
        };

        ranked.push((candidate, score, similarity));
    }

    sort_ranked(snapshot, &mut ranked);
    ranked.truncate(limit);

    debug!(
        query = name,
        resolved = %snapshot.items[queried].name,
        band = ?band,
        results = ranked.len(),
        "single-item query served"
    );

    QueryOutcome::Found {
        resolved: vec![snapshot.items[queried].name.clone()],
        recommendations: ranked
            .into_iter()
            .map(|(idx, _, similarity)| to_recommendation(snapshot, idx, similarity))
            .collect(),
    }
}

/// Profile query: accumulate similarity rows weighted by the user's
/// sentiment for each rated title.
///
/// Summation, not averaging: an item similar to several liked titles
/// outranks one similar to a single title. Scores are normalized by the sum
/// of all supplied ratings for cross-query comparability.
pub fn recommend_for_profile(
    snapshot: &ModelSnapshot,
    ratings: &HashMap<String, f32>,
    limit: usize,
) -> QueryOutcome {
    // Resolve inputs first; accumulate in column order so floating-point
    // summation is deterministic regardless of map iteration order
    let mut resolved: Vec<(usize, f32)> = Vec::new();
    for (name, &rating) in ratings {
        match snapshot.resolve(name) {
            Some(idx) => resolved.push((idx, rating)),
            None => debug!(query = %name, "profile entry resolved to nothing, skipped"),
        }
    }
    if resolved.is_empty() {
        return QueryOutcome::NotFound;
    }
    resolved.sort_unstable_by_key(|&(idx, _)| idx);

    let mut accumulated: HashMap<usize, f32> = HashMap::new();
    for &(rated, rating) in &resolved {
        let weight = match RatingBand::classify(Some(rating)) {
            RatingBand::Liked => rating,
            RatingBand::Disliked => -(6.0 - rating),
            RatingBand::Neutral => NEUTRAL_PROFILE_WEIGHT * rating,
        };
        for candidate in 0..snapshot.anime_count() {
            if let Some(similarity) = snapshot.similarity_between(rated, candidate) {
                *accumulated.entry(candidate).or_insert(0.0) += weight * similarity;
            }
        }
    }

    // Never recommend anything the user already rated, including
    // substring-resolved inputs
    for &(rated, _) in &resolved {
        accumulated.remove(&rated);
    }

    let rating_sum: f32 = ratings.values().sum();
    let mut ranked: Vec<(usize, f32, f32)> = accumulated
        .into_iter()
        .map(|(idx, score)| {
            let normalized = if rating_sum != 0.0 {
                score / rating_sum
            } else {
                score
            };
            (idx, normalized, normalized)
        })
        .collect();

    sort_ranked(snapshot, &mut ranked);
    ranked.truncate(limit);

    debug!(
        inputs = resolved.len(),
        results = ranked.len(),
        "profile query served"
    );

    QueryOutcome::Found {
        resolved: resolved
            .iter()
            .map(|&(idx, _)| snapshot.items[idx].name.clone())
            .collect(),
        recommendations: ranked
            .into_iter()
            .map(|(idx, _, score)| to_recommendation(snapshot, idx, score))
            .collect(),
    }
}

/// Score descending, ties broken by name ascending; keeps results
/// reproducible across rebuilds.
fn sort_ranked(snapshot: &ModelSnapshot, ranked: &mut [(usize, f32, f32)]) {
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| snapshot.items[a.0].name.cmp(&snapshot.items[b.0].name))
    });
}

fn to_recommendation(snapshot: &ModelSnapshot, idx: usize, correlation: f32) -> Recommendation {
    let item = &snapshot.items[idx];
    Recommendation {
        title: item.name.clone(),
        score: item.average_rating,
        genre: item.genre.clone(),
        correlation,
    }
}
