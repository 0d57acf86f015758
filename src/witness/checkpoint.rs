//! Resumable text ingestion.
//!
//! Extraction is the slow, rate-limited step of text ingestion. A checkpoint
//! file records which batch entries were already extracted together with the
//! vertices they resolved to, so an interrupted batch resumes without calling
//! the extractor for them again. The file is JSON and is rewritten whole on
//! every save.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::ids::{UserId, VertexId};
use crate::store::StoreResult;

/// Checkpoint location for `user`'s text batches under `data_dir`.
pub fn checkpoint_path(data_dir: &Path, user: UserId) -> PathBuf {
    data_dir.join(format!("text-checkpoint-{}.json", user.0))
}

/// Newly extracted entries between two checkpoint saves.
pub const CHECKPOINT_EVERY: usize = 10;

/// One extracted batch entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    /// Resolved vertices in entity order; empty when nothing was extracted.
    pub vertices: Vec<VertexId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CheckpointFile {
    /// Size of the batch this progress belongs to.
    items: usize,
    /// Keyed by position in the timestamp-sorted batch.
    entries: BTreeMap<usize, ResolvedEntry>,
}

/// Extraction progress of one text batch.
#[derive(Debug)]
pub struct TextCheckpoint {
    path: PathBuf,
    file: CheckpointFile,
    unsaved: usize,
}

impl TextCheckpoint {
    /// Open the checkpoint at `path` for a batch of `items` entries.
    ///
    /// Progress starts empty when `resume` is false, when no file exists, or
    /// when the file belongs to a batch of another size.
    pub fn open(path: &Path, items: usize, resume: bool) -> StoreResult<Self> {
        let fresh = CheckpointFile {
            items,
            entries: BTreeMap::new(),
        };
        let file = if resume && path.exists() {
            let data = std::fs::read_to_string(path).map_err(|e| StoreError::Io { source: e })?;
            let saved: CheckpointFile =
                serde_json::from_str(&data).map_err(|e| StoreError::Serialization {
                    message: format!("parse {}: {e}", path.display()),
                })?;
            if saved.items == items {
                tracing::info!(
                    path = %path.display(),
                    processed = saved.entries.len(),
                    items,
                    "resuming text ingestion from checkpoint"
                );
                saved
            } else {
                tracing::warn!(
                    path = %path.display(),
                    saved = saved.items,
                    items,
                    "checkpoint belongs to another batch, starting fresh"
                );
                fresh
            }
        } else {
            fresh
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            unsaved: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The saved entry at `index`, if that entry was already extracted.
    pub fn entry(&self, index: usize) -> Option<&ResolvedEntry> {
        self.file.entries.get(&index)
    }

    /// Number of entries already extracted.
    pub fn processed(&self) -> usize {
        self.file.entries.len()
    }

    /// Record an extracted entry, saving every [`CHECKPOINT_EVERY`] entries.
    pub fn record(&mut self, index: usize, entry: ResolvedEntry) -> StoreResult<()> {
        self.file.entries.insert(index, entry);
        self.unsaved += 1;
        if self.unsaved >= CHECKPOINT_EVERY {
            self.save()?;
        }
        Ok(())
    }

    /// Write the checkpoint. The file is replaced by rename, so a crash mid-write
    /// leaves the previous save intact.
    pub fn save(&mut self) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io { source: e })?;
        }
        let json = serde_json::to_string(&self.file).map_err(|e| StoreError::Serialization {
            message: format!("serialize checkpoint: {e}"),
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| StoreError::Io { source: e })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::Io { source: e })?;
        self.unsaved = 0;
        tracing::debug!(
            path = %self.path.display(),
            processed = self.file.entries.len(),
            items = self.file.items,
            "saved checkpoint"
        );
        Ok(())
    }

    /// Delete the checkpoint file once its batch is complete.
    pub fn remove(self) -> StoreResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io { source: e }),
        }
    }
}
