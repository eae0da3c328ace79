//! Durable snapshot of the pending set.
//!
//! At shutdown the pending records are encoded to a single flat file and
//! replayed at the next startup when `--load` is given. The encoding is
//! self-describing MessagePack; any change to the on-disk layout must add a
//! version prefix.

use std::{
    fs,
    path::{Path, PathBuf},
};

use ghost_core::ScheduledRequest;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SnapshotError;

/// Default location of the snapshot file, relative to the working directory.
pub const DEFAULT_SNAPSHOT_PATH: &str = "./ghostdb";

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    requests: Vec<ScheduledRequest>,
}

/// Flat-file store for the pending set.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Creates a store writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the pending set to disk.
    ///
    /// An empty set creates no file. The write goes to a temporary sibling
    /// first and is renamed into place, so readers never observe a partial
    /// snapshot. Idempotent: saving the same set twice overwrites.
    pub fn save(&self, requests: &[ScheduledRequest]) -> Result<(), SnapshotError> {
        if requests.is_empty() {
            return Ok(());
        }

        let snapshot = SnapshotFile { requests: requests.to_vec() };
        let encoded = rmp_serde::to_vec_named(&snapshot)
            .map_err(|e| SnapshotError::Encode { message: e.to_string() })?;

        let staging = self.path.with_extension("tmp");
        fs::write(&staging, &encoded)?;
        fs::rename(&staging, &self.path)?;

        debug!(
            path = %self.path.display(),
            requests = snapshot.requests.len(),
            bytes = encoded.len(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Reads the pending set back and deletes the file.
    ///
    /// A missing file yields an empty set. The file is removed only after a
    /// complete decode pass, so a decode failure leaves it in place for
    /// inspection.
    pub fn load(&self) -> Result<Vec<ScheduledRequest>, SnapshotError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let encoded = fs::read(&self.path)?;
        let snapshot: SnapshotFile = rmp_serde::from_slice(&encoded)
            .map_err(|e| SnapshotError::Decode { message: e.to_string() })?;

        fs::remove_file(&self.path)?;

        debug!(
            path = %self.path.display(),
            requests = snapshot.requests.len(),
            "snapshot loaded"
        );
        Ok(snapshot.requests)
    }
}
