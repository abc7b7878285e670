//! # Data Directory Lock
//!
//! One node per ledger. The lock is an `fs2` exclusive lock on a `LOCK`
//! file holding the owner's PID, released on drop.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("cannot create lock file {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "data directory lock {} already held{}",
        .path.display(),
        .pid.map(|p| format!(" by process {p}")).unwrap_or_default()
    )]
    AlreadyLocked { pid: Option<u32>, path: PathBuf },

    #[error("cannot write lock file: {0}")]
    Write(#[source] io::Error),
}

pub struct DataDirLock {
    file: File,
    path: PathBuf,
}

impl DataDirLock {
    const LOCK_FILE: &'static str = "LOCK";

    /// Take the lock without waiting.
    pub fn acquire(data_dir: &Path) -> Result<Self, LockError> {
        let path = data_dir.join(Self::LOCK_FILE);
        let create = |source| LockError::Create {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(data_dir).map_err(create)?;
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(create)?;

        if file.try_lock_exclusive().is_err() {
            return Err(LockError::AlreadyLocked {
                pid: read_pid(&path),
                path,
            });
        }

        file.set_len(0).map_err(LockError::Write)?;
        writeln!(file, "{}", std::process::id()).map_err(LockError::Write)?;
        file.sync_all().map_err(LockError::Write)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock = DataDirLock::acquire(dir.path()).unwrap();
        assert_eq!(read_pid(lock.path()), Some(std::process::id()));

        match DataDirLock::acquire(dir.path()) {
            Err(LockError::AlreadyLocked { pid, .. }) => {
                assert_eq!(pid, Some(std::process::id()))
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("lock acquired twice"),
        }

        drop(lock);
        assert!(DataDirLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        let lock = DataDirLock::acquire(&nested).unwrap();
        assert!(lock.path().starts_with(&nested));
    }
}
