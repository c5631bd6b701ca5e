//! Run-level advisory lock.
//!
//! Runs are serialized across processes with an exclusive `fs2` lock on a
//! file next to the store. The lock is held from before staging until the
//! change sink has been invoked, and released on drop.

#![allow(clippy::result_large_err)]

use casewatch_core::errors::{ExError, ExErrorKind, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// RAII guard for the exclusive run lock
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Lock file used for the store at `db_path`
    pub fn path_for(db_path: &Path) -> PathBuf {
        db_path.with_extension("lock")
    }

    /// Acquire the lock, retrying until `timeout` elapses
    ///
    /// # Errors
    ///
    /// - `Concurrency`: another run still held the lock after `timeout`
    /// - `Io`: the lock file could not be created or opened
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let io_err = |e: std::io::Error| {
            ExError::new(ExErrorKind::Io)
                .with_op("acquire_run_lock")
                .with_entity_id(path.display().to_string())
                .with_message(e.to_string())
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)
                .map_err(io_err)?;

            if file.try_lock_exclusive().is_ok() {
                tracing::debug!(path = %path.display(), "Acquired run lock");
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }

            if start.elapsed() >= timeout {
                return Err(ExError::new(ExErrorKind::Concurrency)
                    .with_op("acquire_run_lock")
                    .with_entity_id(path.display().to_string())
                    .with_message(format!(
                        "another run holds the lock (waited {:?})",
                        start.elapsed()
                    )));
            }

            thread::sleep(RETRY_INTERVAL);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release explicitly; dropping the guard does the same
    pub fn release(self) {}
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_next_to_store() {
        assert_eq!(
            RunLock::path_for(Path::new("/data/.casewatch/store.db")),
            PathBuf::from("/data/.casewatch/store.lock")
        );
    }

    #[test]
    fn test_second_acquire_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.lock");

        let held = RunLock::acquire(&path, Duration::from_millis(100)).unwrap();
        let err = RunLock::acquire(&path, Duration::from_millis(30)).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Concurrency);

        held.release();
        assert!(RunLock::acquire(&path, Duration::from_millis(100)).is_ok());
    }
}
