//! The byte-oriented storage contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// A key-value store of opaque byte payloads with per-entry expiry.
///
/// `get` reports a missing or expired entry as [`StoreError::NotFound`];
/// anything else is a backend failure. A zero `ttl` on `set` means the
/// entry does not expire, where the backend supports that. Negative
/// durations cannot be expressed and are never passed.
#[async_trait]
pub trait Store: Send + Sync {
    /// Whether a live entry exists. Not consulted by the coordinator
    /// itself.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Fetch the payload stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Store `data` under `key` for `ttl`.
    async fn set(&self, key: &str, ttl: Duration, data: Vec<u8>) -> Result<(), StoreError>;

    /// Drop the entry under `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
