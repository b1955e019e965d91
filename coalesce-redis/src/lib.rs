//! Redis-backed store and locker for `coalesce`.
//!
//! [`RedisStore`] keeps cache payloads as plain Redis strings with `PX`
//! expiry. [`RedisLocker`] implements the key-scoped exclusive lock with
//! `SET NX PX` and a per-acquisition token, retrying with exponential
//! backoff and releasing through a compare-and-delete script so only the
//! holder can remove its own lock entry. [`RedisBackend`] serves both
//! contracts over one multiplexed connection; Redis's single-threaded
//! command ordering makes a store write visible to whoever acquires the
//! lock next.

use std::time::Duration;

use async_trait::async_trait;
use coalesce::{Lock, LockError, Locker, Store, StoreError};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

/// Lifetime of a lock entry; the backstop for locks abandoned by a dead
/// holder.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(8 * 60);

const RETRY_MIN_DELAY: Duration = Duration::from_millis(16);
const RETRY_MAX_DELAY: Duration = Duration::from_millis(4096);
const RETRY_LIMIT: u32 = 32;

/// Deletes the lock entry only while it still carries the holder's token.
const RELEASE_SCRIPT: &str =
    r#"if redis.call("get", KEYS[1]) == ARGV[1] then return redis.call("del", KEYS[1]) else return 0 end"#;

fn store_err(err: redis::RedisError) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Other(err.to_string())
    }
}

fn lock_err(err: redis::RedisError) -> LockError {
    LockError::Other(err.to_string())
}

fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(RETRY_MAX_DELAY)
}

/// [`Store`] over a multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }

    /// Open a connection to `addr` (a `redis://` URL).
    pub async fn connect(addr: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(addr)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self::new(connection))
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        conn.exists(key).await.map_err(store_err)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let mut conn = self.connection.clone();
        let data: Option<Vec<u8>> = conn.get(key).await.map_err(store_err)?;
        data.ok_or(StoreError::NotFound)
    }

    async fn set(&self, key: &str, ttl: Duration, data: Vec<u8>) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        if ttl.is_zero() {
            conn.set::<_, _, ()>(key, data).await.map_err(store_err)
        } else {
            redis::cmd("SET")
                .arg(key)
                .arg(data)
                .arg("PX")
                .arg(ttl.as_millis() as u64)
                .query_async::<()>(&mut conn)
                .await
                .map_err(store_err)
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await.map_err(store_err)
    }
}

/// [`Locker`] over Redis `SET NX PX` with token-guarded release.
///
/// Acquisition retries with exponential backoff until the retry budget is
/// spent. The lock entry's TTL bounds how long a crashed holder can block
/// everyone else; a holder that outlives it loses exclusivity.
#[derive(Clone)]
pub struct RedisLocker {
    connection: MultiplexedConnection,
    lock_ttl: Duration,
}

impl RedisLocker {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self::with_lock_ttl(connection, DEFAULT_LOCK_TTL)
    }

    pub fn with_lock_ttl(connection: MultiplexedConnection, lock_ttl: Duration) -> Self {
        Self {
            connection,
            lock_ttl,
        }
    }

    /// Open a connection to `addr` (a `redis://` URL).
    pub async fn connect(addr: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(addr)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self::new(connection))
    }

    async fn try_obtain(&self, key: &str, token: &str) -> Result<bool, LockError> {
        let mut conn = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("PX")
            .arg(self.lock_ttl.as_millis() as u64)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(lock_err)?;
        Ok(reply.is_some())
    }
}

#[async_trait]
impl Locker for RedisLocker {
    async fn obtain(&self, key: &str) -> Result<Box<dyn Lock>, LockError> {
        let token = Uuid::new_v4().to_string();
        let mut delay = RETRY_MIN_DELAY;

        for attempt in 0..RETRY_LIMIT {
            if self.try_obtain(key, &token).await? {
                return Ok(Box::new(RedisLock {
                    connection: self.connection.clone(),
                    key: key.to_owned(),
                    token,
                }));
            }

            debug!(key, attempt, delay_ms = delay.as_millis() as u64, "lock busy, retrying");
            sleep(delay).await;
            delay = next_delay(delay);
        }

        Err(LockError::FailedLock)
    }
}

struct RedisLock {
    connection: MultiplexedConnection,
    key: String,
    token: String,
}

#[async_trait]
impl Lock for RedisLock {
    async fn release(self: Box<Self>) -> Result<(), LockError> {
        let mut conn = self.connection.clone();
        let released: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await
            .map_err(lock_err)?;

        if released == 1 {
            Ok(())
        } else {
            // The entry expired or was taken over; this handle no longer
            // owned it.
            Err(LockError::FailedUnlock)
        }
    }
}

/// A single Redis connection serving both capability contracts.
#[derive(Clone)]
pub struct RedisBackend {
    store: RedisStore,
    locker: RedisLocker,
}

impl RedisBackend {
    pub async fn connect(addr: &str) -> Result<Self, redis::RedisError> {
        Self::connect_with_lock_ttl(addr, DEFAULT_LOCK_TTL).await
    }

    pub async fn connect_with_lock_ttl(
        addr: &str,
        lock_ttl: Duration,
    ) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(addr)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            store: RedisStore::new(connection.clone()),
            locker: RedisLocker::with_lock_ttl(connection, lock_ttl),
        })
    }
}

#[async_trait]
impl Store for RedisBackend {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.store.exists(key).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.store.get(key).await
    }

    async fn set(&self, key: &str, ttl: Duration, data: Vec<u8>) -> Result<(), StoreError> {
        self.store.set(key, ttl, data).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete(key).await
    }
}

#[async_trait]
impl Locker for RedisBackend {
    async fn obtain(&self, key: &str) -> Result<Box<dyn Lock>, LockError> {
        self.locker.obtain(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_the_cap() {
        assert_eq!(next_delay(Duration::from_millis(16)), Duration::from_millis(32));
        assert_eq!(next_delay(Duration::from_millis(2048)), Duration::from_millis(4096));
        assert_eq!(next_delay(Duration::from_millis(3000)), Duration::from_millis(4096));
        assert_eq!(next_delay(RETRY_MAX_DELAY), RETRY_MAX_DELAY);
    }

    #[test]
    fn test_backend_errors_keep_their_message() {
        let err = redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"));
        match store_err(err) {
            StoreError::Other(message) => assert!(message.contains("connection refused")),
            other => panic!("expected StoreError::Other, got {other:?}"),
        }

        let err = redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"));
        match lock_err(err) {
            LockError::Other(message) => assert!(message.contains("connection refused")),
            other => panic!("expected LockError::Other, got {other:?}"),
        }
    }
}
