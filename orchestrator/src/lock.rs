use std::path::{Path, PathBuf};

use common::error::GraphRagError;
use tokio::fs::OpenOptions;
use tracing::warn;

/// Single-run-per-host lock (spec.md §4.9): `create_new` fails atomically
/// if the file already exists, which is all the mutual exclusion a batch
/// job run from one process needs. Independent of [`common::storage::store::StorageManager`]'s
/// backend abstraction since a host-level lock needs real filesystem
/// semantics even when run artifacts themselves live in an in-memory store.
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Attempts to acquire the lock at `{data_dir}/.graphrag_index.lock`.
    /// Returns `Ok(None)` on contention (another run holds it) unless
    /// `force` is set, in which case a stale lock file is removed first.
    pub async fn acquire(data_dir: &Path, force: bool) -> Result<Option<Self>, GraphRagError> {
        let path = data_dir.join(".graphrag_index.lock");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if force {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => warn!(path = %path.display(), "forced removal of stale run lock"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(GraphRagError::Io(e)),
            }
        }

        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(_) => Ok(Some(Self { path })),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(GraphRagError::Io(e)),
        }
    }

    pub async fn release(self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "failed to remove run lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_first_held() {
        let dir = std::env::temp_dir().join(format!("graphrag_lock_test_{}", uuid::Uuid::new_v4()));
        let lock1 = RunLock::acquire(&dir, false).await.unwrap();
        assert!(lock1.is_some());

        let lock2 = RunLock::acquire(&dir, false).await.unwrap();
        assert!(lock2.is_none());

        lock1.unwrap().release().await;
        let lock3 = RunLock::acquire(&dir, false).await.unwrap();
        assert!(lock3.is_some());
        lock3.unwrap().release().await;
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn force_acquire_clears_stale_lock() {
        let dir = std::env::temp_dir().join(format!("graphrag_lock_test_{}", uuid::Uuid::new_v4()));
        let lock1 = RunLock::acquire(&dir, false).await.unwrap().unwrap();
        let forced = RunLock::acquire(&dir, true).await.unwrap();
        assert!(forced.is_some());
        std::mem::forget(lock1);
        forced.unwrap().release().await;
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
