//! Single-instance guard for the polling loop.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{HarvestError, Result};

/// Exclusive advisory lock on a file, held for the life of the value.
///
/// Two harvesters appending to the same period file would interleave rows,
/// so `run` and `once` refuse to start while another process holds it.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(HarvestError::AlreadyRunning(path.display().to_string()));
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }

        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "Instance lock acquired");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_fails_until_released() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run").join("harvester.lock");

        let first = InstanceLock::acquire(&path).unwrap();
        assert!(matches!(InstanceLock::acquire(&path), Err(HarvestError::AlreadyRunning(_))));

        drop(first);
        assert!(InstanceLock::acquire(&path).is_ok());
    }

    #[test]
    fn lock_file_records_pid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("harvester.lock");
        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(fs::read_to_string(lock.path()).unwrap(), std::process::id().to_string());
    }
}
