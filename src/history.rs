//! Per-path undo history
//!
//! Each snapshot is a complete byte copy of a file kept in a backing file
//! under the history directory. A [`Snapshot`] owns its backing file: it is
//! deleted when the snapshot is dropped, whether that happens after an undo
//! consumed it or because the edit it guarded failed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, TempPath};
use uuid::Uuid;

use crate::error::EditorError;

pub const DEFAULT_MAX_DISK_USAGE_PERCENT: f64 = 60.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub original_path: PathBuf,
    pub size: u64,
}

/// A captured prior state of one file
#[derive(Debug)]
pub struct Snapshot {
    metadata: SnapshotMetadata,
    backing: TempPath,
}

impl Snapshot {
    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }

    pub fn backing_path(&self) -> &Path {
        &self.backing
    }

    pub fn read_to_string(&self) -> Result<String> {
        fs::read_to_string(&self.backing).with_context(|| {
            format!(
                "Failed to read snapshot of {}",
                self.metadata.original_path.display()
            )
        })
    }
}

enum HistoryRoot {
    /// Removed together with the store
    Scoped(TempDir),
    Fixed(PathBuf),
}

/// Mapping from file path to its stack of snapshots, most recent last
pub struct HistoryStore {
    // Declared before `root` so snapshot files go before their directory
    stacks: HashMap<PathBuf, Vec<Snapshot>>,
    root: HistoryRoot,
    max_disk_usage_percent: f64,
}

impl HistoryStore {
    /// Store backed by a fresh process-scoped temp directory
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("agentedit-history-")
            .tempdir()
            .context("Failed to create history directory")?;

        Ok(Self {
            stacks: HashMap::new(),
            root: HistoryRoot::Scoped(dir),
            max_disk_usage_percent: DEFAULT_MAX_DISK_USAGE_PERCENT,
        })
    }

    /// Store backed by a custom directory
    pub fn with_directory(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();

        // Create history directory if it doesn't exist
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create history directory: {}", dir.display()))?;

        Ok(Self {
            stacks: HashMap::new(),
            root: HistoryRoot::Fixed(dir),
            max_disk_usage_percent: DEFAULT_MAX_DISK_USAGE_PERCENT,
        })
    }

    pub fn with_max_disk_usage(mut self, percent: f64) -> Self {
        self.max_disk_usage_percent = percent;
        self
    }

    /// Get the history directory path
    pub fn dir(&self) -> &Path {
        match &self.root {
            HistoryRoot::Scoped(dir) => dir.path(),
            HistoryRoot::Fixed(dir) => dir,
        }
    }

    /// Copy the current content of `path` into a new snapshot without
    /// recording it. Hand it to [`push`](Self::push) once the edit it guards
    /// has succeeded; dropping it instead discards the copy.
    pub fn capture(&self, path: &Path) -> Result<Snapshot> {
        let size = fs::metadata(path)
            .with_context(|| format!("Failed to get file metadata: {}", path.display()))?
            .len();

        #[cfg(unix)]
        crate::disk_space::check_disk_space_for_snapshot(self.dir(), size, self.max_disk_usage_percent)
            .with_context(|| {
                format!(
                    "Cannot record undo history for {}. File size: {}",
                    path.display(),
                    crate::disk_space::DiskSpaceInfo::bytes_to_human(size)
                )
            })?;

        // Millisecond precision keeps ids sortable
        let id = format!(
            "{}-{}",
            Utc::now().format("%Y%m%d-%H%M%S%3f"),
            Uuid::new_v4().to_string().split_at(8).0
        );

        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?
            .to_string_lossy()
            .into_owned();

        let mut backing = tempfile::Builder::new()
            .prefix(&format!("{}.{}.", file_name, id))
            .suffix(".bak")
            .tempfile_in(self.dir())
            .with_context(|| format!("Failed to create snapshot in {}", self.dir().display()))?;

        let mut source =
            File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
        io::copy(&mut source, backing.as_file_mut())
            .with_context(|| format!("Failed to snapshot file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), id = %id, size, "captured snapshot");

        Ok(Snapshot {
            metadata: SnapshotMetadata {
                id,
                timestamp: Utc::now(),
                original_path: path.to_path_buf(),
                size,
            },
            backing: backing.into_temp_path(),
        })
    }

    pub fn push(&mut self, path: &Path, snapshot: Snapshot) {
        self.stacks
            .entry(path.to_path_buf())
            .or_default()
            .push(snapshot);
    }

    /// Remove and return the most recent snapshot for `path`
    pub fn pop(&mut self, path: &Path) -> Result<Snapshot, EditorError> {
        self.stacks
            .get_mut(path)
            .and_then(|stack| stack.pop())
            .ok_or_else(|| EditorError::NoHistory {
                path: path.display().to_string(),
            })
    }

    /// Most recent snapshot for `path`, left in place
    pub fn latest(&self, path: &Path) -> Option<&Snapshot> {
        self.stack(path).last()
    }

    pub fn depth(&self, path: &Path) -> usize {
        self.stack(path).len()
    }

    /// Snapshot metadata for `path`, oldest first
    pub fn entries(&self, path: &Path) -> Vec<&SnapshotMetadata> {
        self.stack(path).iter().map(|s| &s.metadata).collect()
    }

    fn stack(&self, path: &Path) -> &[Snapshot] {
        self.stacks.get(path).map(Vec::as_slice).unwrap_or(&[])
    }
}
