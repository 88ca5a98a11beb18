//! Rating table construction from the two CSV sources
//!
//! Loads the anime metadata and ratings files, validates their headers once,
//! joins ratings to items on `anime_id`, and produces the column-indexed
//! table the model builder pivots. Individually malformed rows are skipped
//! and counted; a missing file, a missing header, or a record that fails
//! UTF-8 decoding is a [`EngineError::DataLoad`] failure.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Dataset sentinel for "watched but not rated"
const UNRATED_SENTINEL: f32 = -1.0;

/// One row of the anime metadata source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimeRecord {
    pub id: u32,
    /// Unique join/display key; columns downstream are keyed by name
    pub name: String,
    pub genre: String,
    pub members: u32,
}

/// One row of the ratings source
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RatingRecord {
    pub user_id: u32,
    pub anime_id: u32,
    /// Source scale 1-10
    pub rating: f32,
}

/// Per-column item identity carried into the pivot
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
    pub genre: String,
}

/// A rating joined to its item's column index
#[derive(Debug, Clone, Copy)]
pub struct JoinedRating {
    pub user_id: u32,
    pub column: usize,
    pub rating: f32,
}

/// Row accounting for one load
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LoadReport {
    pub accepted_ratings: u64,
    pub malformed_anime_rows: u64,
    pub malformed_rating_rows: u64,
    /// Ratings carrying the `-1` "watched, unrated" sentinel
    pub sentinel_ratings: u64,
    /// Ratings whose anime_id had no metadata row
    pub unjoined_ratings: u64,
    pub pruned_users: u64,
    pub pruned_items: u64,
}

/// Normalized join of the two sources, ready for pivoting
#[derive(Debug)]
pub struct RatingTable {
    /// Metadata keyed by anime id
    pub animes: HashMap<u32, AnimeRecord>,
    /// Accepted ratings grouped per user
    pub ratings_by_user: HashMap<u32, Vec<RatingRecord>>,
    /// Columns in lexicographic name order; this fixes the deterministic
    /// column order used everywhere downstream
    pub columns: Vec<ColumnMeta>,
    /// Join rows referencing `columns` by index
    pub rows: Vec<JoinedRating>,
    pub report: LoadReport,
}

impl RatingTable {
    pub fn user_count(&self) -> usize {
        self.ratings_by_user.len()
    }

    pub fn item_count(&self) -> usize {
        self.columns.len()
    }
}

/// Load and join both sources per the engine configuration
pub fn load_rating_table(config: &EngineConfig) -> Result<RatingTable> {
    let mut report = LoadReport::default();

    let animes = load_anime_records(&config.anime_path, &mut report)?;
    let mut ratings = load_rating_records(&config.ratings_path, &mut report)?;

    if config.min_user_ratings > 0 || config.min_item_ratings > 0 {
        prune_sparse(
            &mut ratings,
            config.min_user_ratings,
            config.min_item_ratings,
            &mut report,
        );
    }

    join(animes, ratings, report)
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::Reader::from_path(path).map_err(|e| {
        EngineError::data_load(format!("cannot open {}: {}", path.display(), e))
    })
}

/// Resolve required header names to column indices, in the given order
fn resolve_headers(
    reader: &mut csv::Reader<std::fs::File>,
    path: &Path,
    required: &[&str],
) -> Result<Vec<usize>> {
    let headers = reader
        .headers()
        .map_err(|e| {
            EngineError::data_load(format!("cannot read headers of {}: {}", path.display(), e))
        })?
        .clone();

    let mut indices = Vec::with_capacity(required.len());
    let mut missing = Vec::new();
    for name in required {
        match headers.iter().position(|h| h == *name) {
            Some(idx) => indices.push(idx),
            None => missing.push(*name),
        }
    }

    if !missing.is_empty() {
        return Err(EngineError::data_load(format!(
            "{} is missing required columns: {}",
            path.display(),
            missing.join(", ")
        )));
    }

    Ok(indices)
}

/// A record-level CSV error is either a decoding failure (structural, the
/// whole source is suspect) or a ragged row (skippable).
fn classify_record_error(err: csv::Error, path: &Path) -> Result<()> {
    match err.kind() {
        csv::ErrorKind::Utf8 { .. } => Err(EngineError::data_load(format!(
            "{} is not valid UTF-8; transcode the source before loading: {}",
            path.display(),
            err
        ))),
        _ => Ok(()),
    }
}

fn load_anime_records(path: &Path, report: &mut LoadReport) -> Result<Vec<AnimeRecord>> {
    let mut reader = open_reader(path)?;
    let indices = resolve_headers(&mut reader, path, &["anime_id", "name", "genre", "members"])?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                classify_record_error(e, path)?;
                report.malformed_anime_rows += 1;
                continue;
            }
        };

        let parsed = (|| {
            let id = row.get(indices[0])?.trim().parse::<u32>().ok()?;
            let name = row.get(indices[1])?.trim();
            if name.is_empty() {
                return None;
            }
            let genre = row.get(indices[2])?.trim();
            let members = row.get(indices[3])?.trim().parse::<u32>().ok()?;
            Some(AnimeRecord {
                id,
                name: name.to_string(),
                genre: genre.to_string(),
                members,
            })
        })();

        match parsed {
            Some(record) => records.push(record),
            None => report.malformed_anime_rows += 1,
        }
    }

    info!(
        path = %path.display(),
        loaded = records.len(),
        skipped = report.malformed_anime_rows,
        "loaded anime metadata"
    );

    Ok(records)
}

fn load_rating_records(path: &Path, report: &mut LoadReport) -> Result<Vec<RatingRecord>> {
    let mut reader = open_reader(path)?;
    let indices = resolve_headers(&mut reader, path, &["user_id", "anime_id", "rating"])?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                classify_record_error(e, path)?;
                report.malformed_rating_rows += 1;
                continue;
            }
        };

        let parsed = (|| {
            let user_id = row.get(indices[0])?.trim().parse::<u32>().ok()?;
            let anime_id = row.get(indices[1])?.trim().parse::<u32>().ok()?;
            let rating = row.get(indices[2])?.trim().parse::<f32>().ok()?;
            Some(RatingRecord {
                user_id,
                anime_id,
                rating,
            })
        })();

        match parsed {
            Some(record) if record.rating == UNRATED_SENTINEL => {
                report.sentinel_ratings += 1;
            }
            Some(record) => records.push(record),
            None => report.malformed_rating_rows += 1,
        }
    }

    info!(
        path = %path.display(),
        loaded = records.len(),
        skipped = report.malformed_rating_rows,
        sentinel = report.sentinel_ratings,
        "loaded ratings"
    );

    Ok(records)
}

/// Drop users and items below the configured rating-count floors.
/// Counts are taken once before filtering; one pass, not iterated to a
/// fixed point (matches the offline cleaning step this replaces).
fn prune_sparse(
    ratings: &mut Vec<RatingRecord>,
    min_user_ratings: usize,
    min_item_ratings: usize,
    report: &mut LoadReport,
) {
    let mut per_user: HashMap<u32, usize> = HashMap::new();
    let mut per_item: HashMap<u32, usize> = HashMap::new();
    for r in ratings.iter() {
        *per_user.entry(r.user_id).or_default() += 1;
        *per_item.entry(r.anime_id).or_default() += 1;
    }

    let keep_user: HashSet<u32> = per_user
        .iter()
        .filter(|(_, &n)| n >= min_user_ratings)
        .map(|(&id, _)| id)
        .collect();
    let keep_item: HashSet<u32> = per_item
        .iter()
        .filter(|(_, &n)| n >= min_item_ratings)
        .map(|(&id, _)| id)
        .collect();

    report.pruned_users = (per_user.len() - keep_user.len()) as u64;
    report.pruned_items = (per_item.len() - keep_item.len()) as u64;

    if report.pruned_users > 0 || report.pruned_items > 0 {
        ratings.retain(|r| keep_user.contains(&r.user_id) && keep_item.contains(&r.anime_id));
        warn!(
            pruned_users = report.pruned_users,
            pruned_items = report.pruned_items,
            remaining = ratings.len(),
            "pruned sparse users/items before training"
        );
    }
}

/// Inner-join ratings to metadata and index items by name.
///
/// Duplicate anime names: the first metadata occurrence (file order) wins
/// for genre; ratings for every id sharing the name aggregate under the one
/// column, since the join is by id but the column key is name.
fn join(
    anime_records: Vec<AnimeRecord>,
    ratings: Vec<RatingRecord>,
    mut report: LoadReport,
) -> Result<RatingTable> {
    let mut animes: HashMap<u32, AnimeRecord> = HashMap::new();
    let mut name_meta: HashMap<String, String> = HashMap::new();
    for record in anime_records {
        name_meta
            .entry(record.name.clone())
            .or_insert_with(|| record.genre.clone());
        animes.entry(record.id).or_insert(record);
    }

    let mut names: Vec<&String> = name_meta.keys().collect();
    names.sort();
    // Only names that actually receive ratings become columns; collect first,
    // then compact the column set below.
    let name_to_column: HashMap<String, usize> = names
        .iter()
        .enumerate()
        .map(|(idx, name)| ((*name).clone(), idx))
        .collect();

    let mut rows = Vec::with_capacity(ratings.len());
    let mut ratings_by_user: HashMap<u32, Vec<RatingRecord>> = HashMap::new();
    let mut rated_columns: HashSet<usize> = HashSet::new();

    for rating in ratings {
        let Some(anime) = animes.get(&rating.anime_id) else {
            report.unjoined_ratings += 1;
            continue;
        };
        let column = name_to_column[&anime.name];
        rated_columns.insert(column);
        rows.push(JoinedRating {
            user_id: rating.user_id,
            column,
            rating: rating.rating,
        });
        ratings_by_user.entry(rating.user_id).or_default().push(rating);
    }

    // Compact columns to the rated subset, preserving lexicographic order
    let mut remap = vec![usize::MAX; names.len()];
    let mut columns = Vec::with_capacity(rated_columns.len());
    for (old_idx, name) in names.iter().enumerate() {
        if rated_columns.contains(&old_idx) {
            remap[old_idx] = columns.len();
            columns.push(ColumnMeta {
                name: (*name).clone(),
                genre: name_meta[*name].clone(),
            });
        }
    }
    for row in &mut rows {
        row.column = remap[row.column];
    }

    report.accepted_ratings = rows.len() as u64;

    if rows.is_empty() {
        return Err(EngineError::insufficient_data(
            "joined rating table is empty",
        ));
    }
    if ratings_by_user.is_empty() || columns.is_empty() {
        return Err(EngineError::insufficient_data(
            "no distinct users or items after joining",
        ));
    }

    info!(
        users = ratings_by_user.len(),
        items = columns.len(),
        ratings = rows.len(),
        unjoined = report.unjoined_ratings,
        "built rating table"
    );

    Ok(RatingTable {
        animes,
        ratings_by_user,
        columns,
        rows,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn config_for(dir: &TempDir, anime: &str, ratings: &str) -> EngineConfig {
        EngineConfig {
            anime_path: write_file(dir, "anime.csv", anime),
            ratings_path: write_file(dir, "rating.csv", ratings),
            model_dir: dir.path().join("models"),
            ..EngineConfig::default()
        }
    }

    const ANIME_CSV: &str = "anime_id,name,genre,members\n\
        1,Death Note,Mystery,100000\n\
        2,Code Geass,Action,90000\n\
        3,Clannad,Drama,50000\n";

    #[test]
    fn test_load_and_join() {
        let dir = TempDir::new().unwrap();
        let ratings = "user_id,anime_id,rating\n\
            10,1,9\n\
            10,2,8\n\
            11,1,7\n";
        let table = load_rating_table(&config_for(&dir, ANIME_CSV, ratings)).unwrap();

        assert_eq!(table.user_count(), 2);
        // Clannad received no ratings, so it is not a column
        assert_eq!(table.item_count(), 2);
        assert_eq!(table.columns[0].name, "Code Geass");
        assert_eq!(table.columns[1].name, "Death Note");
        assert_eq!(table.report.accepted_ratings, 3);
        assert_eq!(table.animes.len(), 3);
    }

    #[test]
    fn test_missing_header_is_data_load_error() {
        let dir = TempDir::new().unwrap();
        let bad_anime = "anime_id,title,genre,members\n1,Death Note,Mystery,100000\n";
        let ratings = "user_id,anime_id,rating\n10,1,9\n";
        let err = load_rating_table(&config_for(&dir, bad_anime, ratings)).unwrap_err();
        match err {
            EngineError::DataLoad { message } => assert!(message.contains("name")),
            other => panic!("expected DataLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_data_load_error() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            anime_path: dir.path().join("nope.csv"),
            ratings_path: write_file(&dir, "rating.csv", "user_id,anime_id,rating\n10,1,9\n"),
            model_dir: dir.path().join("models"),
            ..EngineConfig::default()
        };
        assert!(matches!(
            load_rating_table(&config),
            Err(EngineError::DataLoad { .. })
        ));
    }

    #[test]
    fn test_malformed_rows_skipped_and_counted() {
        let dir = TempDir::new().unwrap();
        let ratings = "user_id,anime_id,rating\n\
            10,1,9\n\
            not-a-user,1,9\n\
            11,two,8\n\
            11,1,8\n";
        let table = load_rating_table(&config_for(&dir, ANIME_CSV, ratings)).unwrap();
        assert_eq!(table.report.malformed_rating_rows, 2);
        assert_eq!(table.report.accepted_ratings, 2);
    }

    #[test]
    fn test_sentinel_ratings_dropped() {
        let dir = TempDir::new().unwrap();
        let ratings = "user_id,anime_id,rating\n\
            10,1,-1\n\
            10,2,8\n\
            11,1,7\n";
        let table = load_rating_table(&config_for(&dir, ANIME_CSV, ratings)).unwrap();
        assert_eq!(table.report.sentinel_ratings, 1);
        assert_eq!(table.report.accepted_ratings, 2);
    }

    #[test]
    fn test_unjoined_ratings_counted() {
        let dir = TempDir::new().unwrap();
        let ratings = "user_id,anime_id,rating\n\
            10,1,9\n\
            10,999,8\n";
        let table = load_rating_table(&config_for(&dir, ANIME_CSV, ratings)).unwrap();
        assert_eq!(table.report.unjoined_ratings, 1);
        assert_eq!(table.report.accepted_ratings, 1);
    }

    #[test]
    fn test_empty_join_is_insufficient_data() {
        let dir = TempDir::new().unwrap();
        let ratings = "user_id,anime_id,rating\n10,999,8\n";
        assert!(matches!(
            load_rating_table(&config_for(&dir, ANIME_CSV, ratings)),
            Err(EngineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_pruning_drops_sparse_users_and_items() {
        let dir = TempDir::new().unwrap();
        let ratings = "user_id,anime_id,rating\n\
            10,1,9\n\
            10,2,8\n\
            11,1,7\n\
            11,2,6\n\
            12,3,5\n";
        let config = EngineConfig {
            min_user_ratings: 2,
            min_item_ratings: 2,
            ..config_for(&dir, ANIME_CSV, ratings)
        };
        let table = load_rating_table(&config).unwrap();
        // User 12 (one rating) and Clannad (one rating) are pruned
        assert_eq!(table.report.pruned_users, 1);
        assert_eq!(table.report.pruned_items, 1);
        assert_eq!(table.user_count(), 2);
        assert_eq!(table.item_count(), 2);
    }

    #[test]
    fn test_duplicate_names_share_a_column() {
        let dir = TempDir::new().unwrap();
        let anime = "anime_id,name,genre,members\n\
            1,Death Note,Mystery,100000\n\
            2,Death Note,Thriller,90000\n";
        let ratings = "user_id,anime_id,rating\n\
            10,1,9\n\
            11,2,8\n";
        let table = load_rating_table(&config_for(&dir, anime, ratings)).unwrap();
        assert_eq!(table.item_count(), 1);
        // First metadata occurrence wins
        assert_eq!(table.columns[0].genre, "Mystery");
        assert_eq!(table.report.accepted_ratings, 2);
    }
}
