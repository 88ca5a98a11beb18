//! Versioned snapshot persistence
//!
//! One file per version, `model_v{N}.bin` under the configured model
//! directory; the directory listing defines `latest_version()`. Writes are
//! all-or-nothing: the envelope is serialized into a temp file in the same
//! directory and atomically renamed into place, so a partially written
//! snapshot is never visible to version enumeration.
//!
//! The payload is a self-describing bincode envelope with a format version
//! field; `load` rejects unknown formats instead of misreading them.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::model::{ItemMeta, ModelSnapshot};

const SNAPSHOT_PREFIX: &str = "model_v";
const SNAPSHOT_SUFFIX: &str = ".bin";
const FORMAT_VERSION: u32 = 1;

/// On-disk representation; the square matrix is flattened to a vector plus
/// its dimension and rebuilt on load.
#[derive(Debug, Serialize, Deserialize)]
struct SerializableSnapshot {
    format_version: u32,
    version: u32,
    created_at: DateTime<Utc>,
    source_fingerprint: String,
    items: Vec<ItemMeta>,
    similarity_dim: usize,
    similarity_data: Vec<f32>,
    user_count: u64,
    rating_count: u64,
}

impl SerializableSnapshot {
    fn from_snapshot(snapshot: &ModelSnapshot) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            version: snapshot.version,
            created_at: snapshot.created_at,
            source_fingerprint: snapshot.source_fingerprint.clone(),
            items: snapshot.items.clone(),
            similarity_dim: snapshot.similarity.nrows(),
            similarity_data: snapshot.similarity.iter().copied().collect(),
            user_count: snapshot.user_count,
            rating_count: snapshot.rating_count,
        }
    }

    fn into_snapshot(self) -> anyhow::Result<ModelSnapshot> {
        if self.format_version != FORMAT_VERSION {
            anyhow::bail!(
                "unknown snapshot format version {} (supported: {})",
                self.format_version,
                FORMAT_VERSION
            );
        }
        let similarity =
            Array2::from_shape_vec((self.similarity_dim, self.similarity_dim), self.similarity_data)
                .context("failed to reconstruct similarity matrix")?;
        Ok(ModelSnapshot::new(
            self.version,
            self.created_at,
            self.source_fingerprint,
            self.items,
            similarity,
            self.user_count,
            self.rating_count,
        ))
    }
}

/// Listing entry for one stored snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub version: u32,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// File-backed model store
#[derive(Debug)]
pub struct ModelStore {
    model_dir: PathBuf,
}

impl ModelStore {
    /// Open (creating if necessary) the model directory
    pub fn new(model_dir: impl Into<PathBuf>) -> Result<Self> {
        let model_dir = model_dir.into();
        std::fs::create_dir_all(&model_dir).map_err(|e| {
            EngineError::persistence(format!(
                "cannot create model directory {}: {}",
                model_dir.display(),
                e
            ))
        })?;
        Ok(Self { model_dir })
    }

    fn snapshot_path(&self, version: u32) -> PathBuf {
        self.model_dir
            .join(format!("{SNAPSHOT_PREFIX}{version}{SNAPSHOT_SUFFIX}"))
    }

    fn parse_version(path: &Path) -> Option<u32> {
        let name = path.file_name()?.to_str()?;
        name.strip_prefix(SNAPSHOT_PREFIX)?
            .strip_suffix(SNAPSHOT_SUFFIX)?
            .parse()
            .ok()
    }

    /// Highest stored version, 0 if none. Unparsable file names are ignored.
    pub fn latest_version(&self) -> Result<u32> {
        Ok(self
            .enumerate()
            .map_err(|e| EngineError::persistence(format!("{e:#}")))?
            .into_iter()
            .max()
            .map(|(version, _)| version)
            .unwrap_or(0))
    }

    fn enumerate(&self) -> anyhow::Result<Vec<(u32, PathBuf)>> {
        let entries = std::fs::read_dir(&self.model_dir)
            .with_context(|| format!("cannot read {}", self.model_dir.display()))?;
        let mut versions = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if let Some(version) = Self::parse_version(&path) {
                versions.push((version, path));
            }
        }
        versions.sort_unstable_by_key(|&(version, _)| version);
        Ok(versions)
    }

    /// Persist a snapshot under the next version number.
    ///
    /// Returns the snapshot with its assigned version. `latest_version() + 1`
    /// assignment is safe only under the single-training-worker invariant;
    /// two independent processes persisting concurrently would race.
    pub fn persist(&self, mut snapshot: ModelSnapshot) -> Result<ModelSnapshot> {
        let started = Instant::now();
        let version = self.latest_version()? + 1;
        snapshot.version = version;
        let path = self.snapshot_path(version);

        self.write_atomic(&snapshot, &path).map_err(|e| {
            EngineError::persistence(format!(
                "failed to persist snapshot v{version} to {}: {e:#}",
                path.display()
            ))
        })?;

        info!(
            version,
            path = %path.display(),
            items = snapshot.anime_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "snapshot persisted"
        );

        Ok(snapshot)
    }

    fn write_atomic(&self, snapshot: &ModelSnapshot, path: &Path) -> anyhow::Result<()> {
        let envelope = SerializableSnapshot::from_snapshot(snapshot);
        let temp = NamedTempFile::new_in(&self.model_dir)
            .context("cannot create temp file in model directory")?;
        // Flush and sync explicitly: dropping the writer inside
        // serialize_into would discard a failed tail write, and the rename
        // below must never publish a truncated snapshot
        let mut writer = BufWriter::new(&temp);
        bincode::serialize_into(&mut writer, &envelope)
            .context("bincode serialization failed")?;
        writer.flush().context("flush failed")?;
        drop(writer);
        temp.as_file().sync_all().context("sync failed")?;
        temp.persist(path).context("atomic rename failed")?;
        Ok(())
    }

    /// Load one stored version
    pub fn load(&self, version: u32) -> Result<ModelSnapshot> {
        let started = Instant::now();
        let path = self.snapshot_path(version);

        let snapshot = (|| -> anyhow::Result<ModelSnapshot> {
            let file =
                File::open(&path).with_context(|| format!("cannot open {}", path.display()))?;
            let reader = BufReader::new(file);
            let envelope: SerializableSnapshot =
                bincode::deserialize_from(reader).context("bincode deserialization failed")?;
            envelope.into_snapshot()
        })()
        .map_err(|e| {
            EngineError::persistence(format!("failed to load snapshot v{version}: {e:#}"))
        })?;

        debug!(
            version,
            items = snapshot.anime_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "snapshot loaded"
        );

        Ok(snapshot)
    }

    /// All stored snapshots, ascending by version. `created_at` is the
    /// file's modification time, which for an atomically renamed snapshot
    /// is its publish time.
    pub fn list_versions(&self) -> Result<Vec<SnapshotInfo>> {
        let versions = self
            .enumerate()
            .map_err(|e| EngineError::persistence(format!("{e:#}")))?;

        let mut infos = Vec::with_capacity(versions.len());
        for (version, path) in versions {
            let metadata = std::fs::metadata(&path).map_err(|e| {
                EngineError::persistence(format!("cannot stat {}: {}", path.display(), e))
            })?;
            let created_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            infos.push(SnapshotInfo {
                version,
                path,
                size_bytes: metadata.len(),
                created_at,
            });
        }
        Ok(infos)
    }
}
