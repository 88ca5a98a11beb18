//! Source change detection
//!
//! Fingerprints the two source files by modification time. This is a
//! heuristic, not a content hash: two different contents written with
//! coincidentally identical mtimes are indistinguishable.

use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::error::{EngineError, Result};

fn file_mtime(path: &Path) -> Result<String> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| {
            EngineError::data_load(format!(
                "cannot read modification time of {}: {}",
                path.display(),
                e
            ))
        })?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).map_err(|e| {
        EngineError::data_load(format!(
            "modification time of {} predates the epoch: {}",
            path.display(),
            e
        ))
    })?;
    Ok(format!(
        "{}.{:09}",
        since_epoch.as_secs(),
        since_epoch.subsec_nanos()
    ))
}

/// Fingerprint both sources as `{anime_mtime}_{ratings_mtime}`.
/// An unreadable source is a [`EngineError::DataLoad`] failure, not a
/// silent "unchanged".
pub fn source_fingerprint(anime_path: &Path, ratings_path: &Path) -> Result<String> {
    Ok(format!(
        "{}_{}",
        file_mtime(anime_path)?,
        file_mtime(ratings_path)?
    ))
}

/// Whether the current fingerprint diverges from the one a snapshot recorded
pub fn has_changed(current: &str, recorded: &str) -> bool {
    current != recorded
}
