//! Action results and the error-handler contracts.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CacheError, ErrorCategory};
use crate::keyable::Keyable;

/// What an action produced, together with the caller's caching intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult<T> {
    /// Whether the value should be written to the store.
    pub cache: bool,
    /// Per-result TTL override. `None` or zero defers to the actor's
    /// default TTL.
    pub ttl: Option<Duration>,
    /// The value to return, and possibly cache.
    pub value: T,
}

impl<T> ActionResult<T> {
    /// Cache the value under the actor's default TTL.
    pub fn cached(value: T) -> Self {
        Self {
            cache: true,
            ttl: None,
            value,
        }
    }

    /// Cache the value under an explicit TTL.
    pub fn cached_for(value: T, ttl: Duration) -> Self {
        Self {
            cache: true,
            ttl: Some(ttl),
            value,
        }
    }

    /// Return the value without writing it to the store.
    pub fn uncached(value: T) -> Self {
        Self {
            cache: false,
            ttl: None,
            value,
        }
    }
}

/// Boxed future returned by an action.
pub type ActionFuture<T, E> = Pin<Box<dyn Future<Output = Result<ActionResult<T>, E>> + Send>>;

/// A borrowed, re-invocable handle to the action of the current call.
///
/// Error handlers receive this so they can run the computation anyway when
/// the cache machinery failed around it.
pub struct ActionRef<'a, T, E> {
    inner: &'a (dyn Fn() -> ActionFuture<T, E> + Send + Sync),
}

impl<'a, T, E> ActionRef<'a, T, E> {
    pub(crate) fn new(inner: &'a (dyn Fn() -> ActionFuture<T, E> + Send + Sync)) -> Self {
        Self { inner }
    }

    /// Invoke the underlying action once more.
    pub async fn invoke(&self) -> Result<ActionResult<T>, E> {
        (self.inner)().await
    }
}

impl<T, E> Clone for ActionRef<'_, T, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, E> Copy for ActionRef<'_, T, E> {}

/// Context handed to a pre-action error handler: the machinery failed
/// before the action could run.
pub struct PreActionErrorArgs<'a, T, E> {
    /// The key object the call was made with.
    pub key: &'a dyn Keyable,
    /// The action of the failed call.
    pub action: ActionRef<'a, T, E>,
    /// Which stage failed: `key`, `get` or `lock`.
    pub category: ErrorCategory,
    /// The underlying failure.
    pub error: CacheError,
}

/// Context handed to a post-action error handler: the action succeeded but
/// its result could not be stored.
pub struct PostActionErrorArgs<'a, T, E> {
    /// The key object the call was made with.
    pub key: &'a dyn Keyable,
    /// The action of the failed call.
    pub action: ActionRef<'a, T, E>,
    /// The result that was being stored when the write failed.
    pub result: ActionResult<T>,
    /// Always the `store` stage.
    pub category: ErrorCategory,
    /// The underlying failure.
    pub error: CacheError,
}

/// Handles failures raised before the action runs: key derivation, store
/// reads and lock acquisition. Whatever it returns is forwarded to the
/// caller.
#[async_trait]
pub trait PreActionErrorHandler<T, E>: Send + Sync {
    async fn handle(&self, args: PreActionErrorArgs<'_, T, E>) -> Result<T, E>;
}

/// Handles failures raised after the action ran: marshalling and store
/// writes. Whatever it returns is forwarded to the caller.
#[async_trait]
pub trait PostActionErrorHandler<T, E>: Send + Sync {
    async fn handle(&self, args: PostActionErrorArgs<'_, T, E>) -> Result<T, E>;
}

/// Default pre-action policy: run the action in-line and return its value
/// without storing it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPreActionErrorHandler;

#[async_trait]
impl<T, E> PreActionErrorHandler<T, E> for DefaultPreActionErrorHandler
where
    T: Send + Sync + 'static,
    E: Send + 'static,
{
    async fn handle(&self, args: PreActionErrorArgs<'_, T, E>) -> Result<T, E> {
        let result = args.action.invoke().await?;
        Ok(result.value)
    }
}

/// Default post-action policy: return the already-computed value and treat
/// the failed store write as logged-only.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPostActionErrorHandler;

#[async_trait]
impl<T, E> PostActionErrorHandler<T, E> for DefaultPostActionErrorHandler
where
    T: Send + Sync + 'static,
    E: Send + 'static,
{
    async fn handle(&self, args: PostActionErrorArgs<'_, T, E>) -> Result<T, E> {
        Ok(args.result.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_defers_ttl_to_actor() {
        let result = ActionResult::cached(7);
        assert!(result.cache);
        assert_eq!(result.ttl, None);
        assert_eq!(result.value, 7);
    }

    #[test]
    fn test_cached_for_carries_explicit_ttl() {
        let result = ActionResult::cached_for("x", Duration::from_secs(60));
        assert!(result.cache);
        assert_eq!(result.ttl, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_uncached_never_carries_ttl() {
        let result = ActionResult::uncached(7);
        assert!(!result.cache);
        assert_eq!(result.ttl, None);
    }
}
