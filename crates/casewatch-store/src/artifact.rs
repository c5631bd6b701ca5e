//! Artifact publication.
//!
//! A run's change set is written to `<dir>/<run_id>.json` through a temp
//! file and a rename, so a collaborator polling the directory only ever sees
//! complete artifacts. Artifacts are keyed by run id: publishing the same run
//! twice rewrites the same file with the same content.

#![allow(clippy::result_large_err)]

use crate::errors::{io_error, Result};
use crate::runs::{clear_artifact, record_artifact};
use casewatch_core::model::ArtifactBlob;
use casewatch_core_types::RunId;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

/// Atomically write bytes to a file
///
/// Uses temp file + rename to ensure atomic write
pub fn atomic_write(target_path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = target_path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error("create_artifact_dir", e))?;
    }

    let temp_path = target_path.with_extension("json.tmp");

    fs::write(&temp_path, content).map_err(|e| io_error("write_artifact_temp", e))?;

    fs::rename(&temp_path, target_path).map_err(|e| io_error("rename_artifact_temp", e))?;

    Ok(())
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error("remove_artifact", e)),
    }
}

/// Directory of published artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the artifact of `run_id` lives
    pub fn path_for(&self, run_id: &RunId) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    /// Write the artifact and record its path and digest on the run row
    ///
    /// ## Errors
    ///
    /// - `Io`: the file could not be written
    /// - `Persistence`: the run row could not be updated
    pub fn publish(&self, conn: &Connection, blob: &ArtifactBlob) -> Result<PathBuf> {
        let path = self.dir.join(blob.file_name());
        atomic_write(&path, &blob.bytes)?;
        let recorded = record_artifact(conn, &blob.run_id, &path.to_string_lossy(), &blob.digest);
        if let Err(e) = recorded {
            // An unrecorded file must not look published.
            if let Err(remove_err) = remove_if_present(&path) {
                tracing::warn!(
                    path = %path.display(),
                    error = %remove_err,
                    "Could not remove unrecorded artifact"
                );
            }
            return Err(e);
        }

        tracing::debug!(
            run_id = %blob.run_id,
            path = %path.display(),
            event_count = blob.event_count,
            "Published artifact"
        );
        Ok(path)
    }

    /// Take back the artifact of a run that will not be promoted
    ///
    /// Removes the file first and then clears the path on the run row, so a
    /// failing row update never leaves the file behind. Returns whether a
    /// file was removed.
    ///
    /// ## Errors
    ///
    /// - `Io`: the file exists but could not be removed
    /// - `Persistence`: the run row could not be updated
    pub fn withdraw(&self, conn: &Connection, run_id: &RunId) -> Result<bool> {
        let path = self.path_for(run_id);
        let removed = remove_if_present(&path)?;
        clear_artifact(conn, run_id)?;
        if removed {
            tracing::info!(run_id = %run_id, path = %path.display(), "Withdrew artifact");
        }
        Ok(removed)
    }

    /// Read back a published artifact
    pub fn read(&self, run_id: &RunId) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(run_id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read_artifact", e)),
        }
    }
}
