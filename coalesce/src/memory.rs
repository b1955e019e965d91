//! In-process store backend.
//!
//! Uses Moka for bounded capacity and per-entry TTL, so a local deployment
//! can run the same coordination flow as a networked one without extra
//! infrastructure.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::sync::Cache;
use moka::Expiry;

use crate::error::StoreError;
use crate::store::Store;

const DEFAULT_CAPACITY: u64 = 10_000;

#[derive(Clone)]
struct Entry {
    data: Vec<u8>,
    ttl: Option<Duration>,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        entry.ttl
    }
}

/// Bounded in-memory [`Store`] with per-entry expiry.
///
/// A zero TTL stores the entry without expiry; eviction beyond TTL is the
/// cache's capacity policy.
#[derive(Clone)]
pub struct MemoryStore {
    cache: Cache<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a store holding at most `max_capacity` entries.
    pub fn with_capacity(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.cache.contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.cache
            .get(key)
            .map(|entry| entry.data)
            .ok_or(StoreError::NotFound)
    }

    async fn set(&self, key: &str, ttl: Duration, data: Vec<u8>) -> Result<(), StoreError> {
        let ttl = (!ttl.is_zero()).then_some(ttl);
        self.cache.insert(key.to_owned(), Entry { data, ttl });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.cache.invalidate(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemoryStore::new();
        store
            .set("sessions###a", Duration::from_secs(60), b"payload".to_vec())
            .await
            .unwrap();

        assert!(store.exists("sessions###a").await.unwrap());
        assert_eq!(store.get("sessions###a").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let store = MemoryStore::new();
        assert_eq!(store.get("absent").await, Err(StoreError::NotFound));
        assert!(!store.exists("absent").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let store = MemoryStore::new();
        store
            .set("sessions###a", Duration::from_secs(60), b"payload".to_vec())
            .await
            .unwrap();
        store.delete("sessions###a").await.unwrap();
        assert_eq!(store.get("sessions###a").await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_deleting_absent_key_is_fine() {
        let store = MemoryStore::new();
        store.delete("absent").await.unwrap();
    }

    #[tokio::test]
    async fn test_entries_expire_after_their_ttl() {
        let store = MemoryStore::new();
        store
            .set("sessions###a", Duration::from_millis(100), b"payload".to_vec())
            .await
            .unwrap();

        assert!(store.exists("sessions###a").await.unwrap());
        sleep(Duration::from_millis(250)).await;
        assert_eq!(store.get("sessions###a").await, Err(StoreError::NotFound));
        assert!(!store.exists("sessions###a").await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_ttl_means_no_expiry() {
        let store = MemoryStore::new();
        store
            .set("sessions###a", Duration::ZERO, b"payload".to_vec())
            .await
            .unwrap();

        sleep(Duration::from_millis(150)).await;
        assert_eq!(store.get("sessions###a").await.unwrap(), b"payload");
    }
}
