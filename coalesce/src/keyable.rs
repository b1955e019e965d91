//! Deriving stable string keys from caller-supplied key objects.

use std::collections::BTreeMap;

use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::error::KeyError;

/// A value that can deterministically produce a string cache key.
///
/// Strings are their own key. Structured keys hash a canonical encoding so
/// equal logical content always lands on the same entry.
pub trait Keyable: Send + Sync {
    fn key(&self) -> Result<String, KeyError>;
}

impl Keyable for str {
    fn key(&self) -> Result<String, KeyError> {
        Ok(self.to_owned())
    }
}

impl Keyable for String {
    fn key(&self) -> Result<String, KeyError> {
        Ok(self.clone())
    }
}

impl<K> Keyable for &K
where
    K: Keyable + ?Sized,
{
    fn key(&self) -> Result<String, KeyError> {
        (**self).key()
    }
}

/// A string-to-value mapping key.
///
/// The derived key is the lowercase hex SHA-1 of the map's MessagePack
/// encoding. The ordered map makes the encoding identical for equal
/// content regardless of insertion order, and the self-describing encoding
/// keeps nested maps, numbers, booleans and strings unambiguous.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyableMap(BTreeMap<String, Value>);

impl KeyableMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the map for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }
}

impl From<BTreeMap<String, Value>> for KeyableMap {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl Keyable for KeyableMap {
    fn key(&self) -> Result<String, KeyError> {
        let encoded = rmp_serde::to_vec(&self.0).map_err(|e| KeyError(e.to_string()))?;
        let mut hasher = Sha1::new();
        hasher.update(&encoded);
        Ok(hex::encode(hasher.finalize()))
    }
}
