//! The node-wide lock (`SchedulerConfig::global_lock_path`) serializing every
//! training run across all profiles and model types, so a single node never
//! runs two trainings concurrently regardless of how many profiles are due.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

/// A held global lock; unlocked and closed on drop.
pub struct GlobalLock {
    file: File,
}

impl GlobalLock {
    /// Blocks until the lock is free.
    pub fn acquire(path: &Path) -> std::io::Result<Self> {
        let file = open(path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }

    /// Non-blocking attempt; `Ok(None)` if another process already holds it.
    pub fn try_acquire(path: &Path) -> std::io::Result<Option<Self>> {
        let file = open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn open(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).write(true).truncate(false).open(path)
}

impl Drop for GlobalLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_try_acquire_fails_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("global.lock");

        let first = GlobalLock::try_acquire(&path).unwrap();
        assert!(first.is_some());
        let second = GlobalLock::try_acquire(&path).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("global.lock");

        let first = GlobalLock::try_acquire(&path).unwrap().unwrap();
        drop(first);
        let second = GlobalLock::try_acquire(&path).unwrap();
        assert!(second.is_some());
    }
}
