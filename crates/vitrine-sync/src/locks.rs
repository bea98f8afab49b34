//! Per-key async locks.
//!
//! Work on one [`SyncKey`] is serialized; work on different keys runs
//! concurrently. Each key gets its own `tokio::sync::Mutex`, created on first
//! use and dropped by [`KeyLocks::prune`] once nobody holds it.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::freshness::SyncKey;

/// A map of async mutexes keyed by [`SyncKey`].
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: DashMap<SyncKey, Arc<Mutex<()>>>,
}

impl KeyLocks {
    /// Create an empty lock map.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &SyncKey) -> Arc<Mutex<()>> {
        let entry = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &SyncKey) -> OwnedMutexGuard<()> {
        self.lock_for(key).lock_owned().await
    }

    /// Drop locks that are neither held nor awaited.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.locks.len()
    }

    /// Number of locks currently allocated.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no lock is allocated.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
