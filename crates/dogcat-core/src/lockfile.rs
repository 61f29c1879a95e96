//! Advisory inter-process locking around the append/compaction critical section.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Holds an open handle to `.issues.lock` and releases the advisory lock on drop.
pub struct LockGuard {
    file: File,
}

impl LockGuard {
    /// Block until the exclusive advisory lock on `path` is acquired,
    /// creating the (empty, never read) lock file if it doesn't exist.
    pub fn acquire(path: &Path) -> crate::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(|e| crate::Error::Lock(format!("opening lock file {}: {e}", path.display())))?;

        file.lock_exclusive()
            .map_err(|e| crate::Error::Lock(format!("acquiring lock on {}: {e}", path.display())))?;

        Ok(Self { file })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".issues.lock");
        let guard = LockGuard::acquire(&path).unwrap();
        assert!(path.exists());
        drop(guard);
    }

    #[test]
    fn lock_can_be_reacquired_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".issues.lock");
        {
            let _guard = LockGuard::acquire(&path).unwrap();
        }
        let _guard2 = LockGuard::acquire(&path).unwrap();
    }
}
