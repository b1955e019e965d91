//! Mutual exclusion contracts and the in-process locker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::LockError;

/// Produces a scoped exclusive lock per key.
///
/// `obtain` blocks, with whatever retry discipline the backend applies,
/// until the lock is held, the retry budget runs out, or the backend
/// fails. The returned handle is released at most once; backends give lock
/// entries a bounded lifetime so abandoned handles expire on their own.
#[async_trait]
pub trait Locker: Send + Sync {
    async fn obtain(&self, key: &str) -> Result<Box<dyn Lock>, LockError>;
}

/// An exclusive lock held on one key.
#[async_trait]
pub trait Lock: Send + Sync {
    /// Give the lock back.
    async fn release(self: Box<Self>) -> Result<(), LockError>;
}

/// Refcounted registry of per-key async mutexes.
///
/// Entries are created on first use and erased when the last interested
/// caller releases, so the map only holds keys with live contention.
#[derive(Clone, Default)]
pub struct MultiMutex {
    entries: Arc<StdMutex<HashMap<String, MutexEntry>>>,
}

struct MutexEntry {
    mutex: Arc<AsyncMutex<()>>,
    refcount: usize,
}

impl MultiMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the mutex for `key`, creating the entry if nobody holds or
    /// awaits it. Registration happens under the registry guard, before
    /// the mutex is awaited, so concurrent callers agree on a single
    /// mutex instance per key.
    pub async fn lock(&self, key: &str) -> MultiMutexGuard {
        let mutex = {
            let mut entries = self.lock_entries();
            let entry = entries.entry(key.to_owned()).or_insert_with(|| MutexEntry {
                mutex: Arc::new(AsyncMutex::new(())),
                refcount: 0,
            });
            entry.refcount += 1;
            Arc::clone(&entry.mutex)
        };

        let guard = mutex.lock_owned().await;
        MultiMutexGuard {
            registry: self.clone(),
            key: key.to_owned(),
            guard: Some(guard),
        }
    }

    /// Number of keys with live interest.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop one reference to `key`. The refcount equals the number of
    /// unreleased `lock` calls for the key; a release without a matching
    /// acquisition is a bookkeeping bug.
    fn release(&self, key: &str) {
        let mut entries = self.lock_entries();
        let entry = entries
            .get_mut(key)
            .unwrap_or_else(|| panic!("released lock key {key:?} that was never obtained"));
        entry.refcount -= 1;
        if entry.refcount == 0 {
            entries.remove(key);
        }
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, MutexEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Guard returned by [`MultiMutex::lock`]. Dropping it releases the mutex
/// and then the registry reference.
pub struct MultiMutexGuard {
    registry: MultiMutex,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MultiMutexGuard {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            drop(guard);
            self.registry.release(&self.key);
        }
    }
}

/// In-process [`Locker`] over a [`MultiMutex`].
///
/// Pairs with [`MemoryStore`](crate::MemoryStore) to give a fully local
/// deployment the same coordination shape as a networked one.
#[derive(Clone, Default)]
pub struct MutexLocker {
    mutexes: MultiMutex,
}

impl MutexLocker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Locker for MutexLocker {
    async fn obtain(&self, key: &str) -> Result<Box<dyn Lock>, LockError> {
        let guard = self.mutexes.lock(key).await;
        Ok(Box::new(MutexLock { guard }))
    }
}

struct MutexLock {
    guard: MultiMutexGuard,
}

#[async_trait]
impl Lock for MutexLock {
    async fn release(self: Box<Self>) -> Result<(), LockError> {
        drop(self.guard);
        Ok(())
    }
}
