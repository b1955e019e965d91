//! Mock collaborators for exercising the coordinator in tests.
//!
//! Shapes mirror the real backends but answer from per-key canned results
//! and record every call they see.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{LockError, StoreError};
use crate::lock::{Lock, Locker};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    Exists,
    Get,
    Set { ttl: Duration, data: Vec<u8> },
    Delete,
    Obtain,
    Release,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub op: MockOp,
    pub key: String,
}

/// Canned-response [`Store`]. Unconfigured keys read as missing and accept
/// writes.
#[derive(Clone, Default)]
pub struct MockStore {
    exists_ret: HashMap<String, Result<bool, StoreError>>,
    get_ret: HashMap<String, Result<Vec<u8>, StoreError>>,
    set_ret: HashMap<String, Result<(), StoreError>>,
    delete_ret: HashMap<String, Result<(), StoreError>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists_ret(&mut self, key: &str, ret: Result<bool, StoreError>) -> Self {
        self.exists_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn get_ret(&mut self, key: &str, ret: Result<Vec<u8>, StoreError>) -> Self {
        self.get_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn set_ret(&mut self, key: &str, ret: Result<(), StoreError>) -> Self {
        self.set_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn delete_ret(&mut self, key: &str, ret: Result<(), StoreError>) -> Self {
        self.delete_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock_calls().clone()
    }

    fn record(&self, op: MockOp, key: &str) {
        self.lock_calls().push(MockCall {
            op,
            key: key.to_owned(),
        });
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<MockCall>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Store for MockStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.record(MockOp::Exists, key);
        self.exists_ret.get(key).cloned().unwrap_or(Ok(false))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.record(MockOp::Get, key);
        self.get_ret
            .get(key)
            .cloned()
            .unwrap_or(Err(StoreError::NotFound))
    }

    async fn set(&self, key: &str, ttl: Duration, data: Vec<u8>) -> Result<(), StoreError> {
        self.record(MockOp::Set { ttl, data }, key);
        self.set_ret.get(key).cloned().unwrap_or(Ok(()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.record(MockOp::Delete, key);
        self.delete_ret.get(key).cloned().unwrap_or(Ok(()))
    }
}

/// Canned-response [`Locker`]. Grants every lock unless a failure was
/// injected for the key. Provides no actual exclusion; use
/// [`MutexLocker`](crate::MutexLocker) where contention matters.
#[derive(Clone, Default)]
pub struct MockLocker {
    obtain_ret: HashMap<String, LockError>,
    release_ret: HashMap<String, LockError>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockLocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn obtain_err(&mut self, key: &str, err: LockError) -> Self {
        self.obtain_ret.insert(key.to_owned(), err);
        self.clone()
    }

    pub fn release_err(&mut self, key: &str, err: LockError) -> Self {
        self.release_ret.insert(key.to_owned(), err);
        self.clone()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock_calls().clone()
    }

    fn record(&self, op: MockOp, key: &str) {
        self.lock_calls().push(MockCall {
            op,
            key: key.to_owned(),
        });
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<MockCall>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Locker for MockLocker {
    async fn obtain(&self, key: &str) -> Result<Box<dyn Lock>, LockError> {
        self.record(MockOp::Obtain, key);
        if let Some(err) = self.obtain_ret.get(key) {
            return Err(err.clone());
        }
        Ok(Box::new(MockLock {
            locker: self.clone(),
            key: key.to_owned(),
        }))
    }
}

struct MockLock {
    locker: MockLocker,
    key: String,
}

#[async_trait]
impl Lock for MockLock {
    async fn release(self: Box<Self>) -> Result<(), LockError> {
        self.locker.record(MockOp::Release, &self.key);
        match self.locker.release_ret.get(&self.key) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
