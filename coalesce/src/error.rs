//! Error types for the caching pipeline.
//!
//! Collaborator failures keep their own enums ([`StoreError`], [`LockError`],
//! [`CodecError`], [`KeyError`]) so backends and tests can construct and
//! match them directly. [`CacheError`] wraps them transparently for handler
//! dispatch, and [`ErrorCategory`] tags which stage of a call failed.

use std::fmt;

use thiserror::Error;

/// Errors surfaced by a [`Store`](crate::Store) backend.
///
/// `NotFound` is not a failure: it is the distinguished miss signal that
/// sends a call down the lock-and-load path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No live entry under the key.
    #[error("not found in store")]
    NotFound,
    /// The backend did not answer in time.
    #[error("store timeout")]
    Timeout,
    /// Any other backend failure.
    #[error("store error: {0}")]
    Other(String),
}

/// Errors surfaced by a [`Locker`](crate::Locker) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The lock could not be obtained: retry budget spent, backend
    /// refusal, or cancellation.
    #[error("failed to obtain lock")]
    FailedLock,
    /// The lock could not be released, typically because it already
    /// expired or was taken over.
    #[error("failed to release lock")]
    FailedUnlock,
    #[error("lock error: {0}")]
    Other(String),
}

/// Errors produced by a [`Codec`](crate::Codec).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// A keyable refused to produce a string key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to derive cache key: {0}")]
pub struct KeyError(pub String);

/// Any failure raised by the cache machinery itself, as handed to error
/// handlers. Action errors never appear here; they go back to the caller
/// untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl CacheError {
    /// Whether this is the store's miss signal rather than a real failure.
    pub(crate) fn is_not_found(&self) -> bool {
        matches!(self, CacheError::Store(StoreError::NotFound))
    }
}

/// Which stage of a call failed. Handlers dispatch on this tag; the set is
/// closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Key derivation failed.
    Key,
    /// A store read, or decoding the fetched bytes, failed.
    Get,
    /// Lock acquisition failed.
    Lock,
    /// Marshalling or the store write failed after the action ran.
    Store,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Key => "key",
            ErrorCategory::Get => "get",
            ErrorCategory::Lock => "lock",
            ErrorCategory::Store => "store",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_display_matches_tag_set() {
        assert_eq!(ErrorCategory::Key.to_string(), "key");
        assert_eq!(ErrorCategory::Get.to_string(), "get");
        assert_eq!(ErrorCategory::Lock.to_string(), "lock");
        assert_eq!(ErrorCategory::Store.to_string(), "store");
    }

    #[test]
    fn test_cache_error_preserves_underlying_error() {
        let err = CacheError::from(StoreError::Other("connection reset".to_string()));
        assert_eq!(err, CacheError::Store(StoreError::Other("connection reset".to_string())));
        // Transparent wrapping keeps the backend message visible.
        assert_eq!(err.to_string(), "store error: connection reset");
    }

    #[test]
    fn test_not_found_is_a_miss_not_a_failure() {
        assert!(CacheError::from(StoreError::NotFound).is_not_found());
        assert!(!CacheError::from(StoreError::Timeout).is_not_found());
        assert!(!CacheError::from(LockError::FailedLock).is_not_found());
    }
}
