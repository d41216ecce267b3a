//! Per-file locking plus a store-wide exclusivity lock for bulk operations.
//!
//! Concurrent writers to different files proceed in parallel; writers to the
//! same file are serialized. Bulk operations (dedup, migration, batch
//! enhance) acquire the store-wide lock in write mode so they never
//! interleave with an individual record write.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
pub struct LockRegistry {
    store_lock: RwLock<()>,
    file_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for a single relative path. Held only across the
    /// file read/merge/write critical section; never across external I/O.
    pub async fn lock_file(&self, relative: &str) -> FileGuard {
        let handle = {
            let mut locks = self.file_locks.lock().await;
            locks.entry(relative.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        FileGuard { _handle: handle.clone(), _guard: OwnedMutexGuard::acquire(handle).await }
    }

    /// Acquires the store-wide lock in shared mode; normal single-record
    /// operations hold this while they run.
    pub async fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.store_lock.read().await
    }

    /// Acquires the store-wide lock in exclusive mode; bulk operations hold
    /// this for their whole run.
    pub async fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.store_lock.write().await
    }
}

/// A lock guard tied to one relative path, kept alive by holding a clone of
/// its `Arc<Mutex<()>>` alongside the borrowed guard.
pub struct FileGuard {
    _handle: Arc<Mutex<()>>,
    _guard: OwnedMutexGuard,
}

/// Small helper so `FileGuard` can own both the `Arc` and a guard borrowed
/// from it without a self-referential struct — resolved with `tokio`'s
/// `Mutex::lock_owned`.
struct OwnedMutexGuard(tokio::sync::OwnedMutexGuard<()>);

impl OwnedMutexGuard {
    async fn acquire(handle: Arc<Mutex<()>>) -> Self {
        OwnedMutexGuard(handle.lock_owned().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn distinct_files_lock_independently() {
        let registry = LockRegistry::new();
        let g1 = registry.lock_file("a.md").await;
        let g2 = registry.lock_file("b.md").await;
        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn store_lock_allows_multiple_readers() {
        let registry = LockRegistry::new();
        let r1 = registry.read().await;
        let r2 = registry.read().await;
        drop(r1);
        drop(r2);
    }
}
