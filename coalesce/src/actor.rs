//! The per-namespace coordination actor.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::codec::{Codec, JsonCodec};
use crate::error::{CacheError, ErrorCategory};
use crate::keyable::Keyable;
use crate::lock::Locker;
use crate::store::Store;
use crate::types::{
    ActionFuture, ActionRef, ActionResult, DefaultPostActionErrorHandler,
    DefaultPreActionErrorHandler, PostActionErrorArgs, PostActionErrorHandler,
    PreActionErrorArgs, PreActionErrorHandler,
};

/// Separator between the actor name and the derived key. Not escaped:
/// names or derived keys containing it can collide with other entries.
const KEY_SEPARATOR: &str = "###";

/// Prefix turning a cache key into its lock key.
const LOCK_PREFIX: &str = "lock###";

/// TTL applied to stored entries when neither the actor nor the action
/// result picked one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Per-namespace cache coordinator for values of type `T`, computed by
/// actions failing with `E`.
///
/// [`run`](Actor::run) returns the cached value when one exists. Otherwise
/// it takes a key-scoped lock, re-checks the store, executes the action at
/// most once among the callers contending on that key, stores the result
/// if the action asked for that, and returns it. Failures of the cache
/// machinery are routed through replaceable handlers; action failures go
/// back to the caller as-is.
///
/// Actors hold no per-call state and are cheap to clone. The intended
/// shape is one actor per namespace, shared across tasks.
pub struct Actor<T, E> {
    name: String,
    ttl: Duration,
    store: Arc<dyn Store>,
    locker: Arc<dyn Locker>,
    codec: Arc<dyn Codec<T>>,
    pre_handler: Arc<dyn PreActionErrorHandler<T, E>>,
    post_handler: Arc<dyn PostActionErrorHandler<T, E>>,
}

impl<T, E> Clone for Actor<T, E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            ttl: self.ttl,
            store: Arc::clone(&self.store),
            locker: Arc::clone(&self.locker),
            codec: Arc::clone(&self.codec),
            pre_handler: Arc::clone(&self.pre_handler),
            post_handler: Arc::clone(&self.post_handler),
        }
    }
}

/// How a call failed, before handler dispatch.
enum Failure<T, E> {
    /// The machinery failed before the action could run.
    Pre {
        category: ErrorCategory,
        error: CacheError,
    },
    /// The action succeeded but its result could not be stored.
    Post {
        result: ActionResult<T>,
        error: CacheError,
    },
    /// The action itself failed.
    Action(E),
}

impl<T, E> Failure<T, E> {
    fn pre(category: ErrorCategory, error: CacheError) -> Self {
        Failure::Pre { category, error }
    }
}

impl<T, E> Actor<T, E>
where
    T: Send + Sync + 'static,
    E: Send + 'static,
{
    /// Create an actor for the namespace `name`.
    ///
    /// The cache key for a call is `{name}###{derived}` and the lock key
    /// is that string behind a `lock###` prefix, so `name` must be unique
    /// among actors sharing a store.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty. That is a wiring mistake, caught at
    /// construction rather than on the first call.
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn Store>,
        locker: Arc<dyn Locker>,
        codec: Arc<dyn Codec<T>>,
    ) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "actor name must not be empty");
        Self {
            name,
            ttl: DEFAULT_TTL,
            store,
            locker,
            codec,
            pre_handler: Arc::new(DefaultPreActionErrorHandler),
            post_handler: Arc::new(DefaultPostActionErrorHandler),
        }
    }

    /// Create an actor over a single backend implementing both the store
    /// and the locker contracts.
    pub fn from_backend<B>(name: impl Into<String>, backend: Arc<B>, codec: Arc<dyn Codec<T>>) -> Self
    where
        B: Store + Locker + 'static,
    {
        Self::new(name, backend.clone(), backend, codec)
    }

    /// Default TTL for stored entries. Zero disables storing except for
    /// results carrying their own positive TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Replace the handler for failures raised before the action runs.
    pub fn with_pre_action_error_handler(
        mut self,
        handler: Arc<dyn PreActionErrorHandler<T, E>>,
    ) -> Self {
        self.pre_handler = handler;
        self
    }

    /// Replace the handler for failures raised after the action ran.
    pub fn with_post_action_error_handler(
        mut self,
        handler: Arc<dyn PostActionErrorHandler<T, E>>,
    ) -> Self {
        self.post_handler = handler;
        self
    }

    /// Return the cached value for `key`, or run `action` to produce it.
    ///
    /// Concurrent calls on the same resolved key serialize on the lock,
    /// and the action runs at most once among them provided the winner
    /// cached its result. Action errors come back unchanged; failures of
    /// the cache machinery go through the configured handlers instead.
    pub async fn run<K, F, Fut>(&self, key: K, action: F) -> Result<T, E>
    where
        K: Keyable,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<ActionResult<T>, E>> + Send + 'static,
    {
        let wrapped = move || -> ActionFuture<T, E> { Box::pin(action()) };
        let action = ActionRef::new(&wrapped);
        let key: &dyn Keyable = &key;

        match self.coordinate(key, action).await {
            Ok(value) => Ok(value),
            Err(Failure::Action(err)) => Err(err),
            Err(Failure::Pre { category, error }) => {
                error!(category = %category, error = %error, "cache machinery failed before action");
                let args = PreActionErrorArgs {
                    key,
                    action,
                    category,
                    error,
                };
                self.pre_handler.handle(args).await
            }
            Err(Failure::Post { result, error }) => {
                let category = ErrorCategory::Store;
                error!(category = %category, error = %error, "cache machinery failed after action");
                let args = PostActionErrorArgs {
                    key,
                    action,
                    result,
                    category,
                    error,
                };
                self.post_handler.handle(args).await
            }
        }
    }

    /// Best-effort removal of the entry for `key`. Takes no lock; a racing
    /// call may repopulate the entry immediately.
    pub async fn invalidate<K: Keyable>(&self, key: K) -> Result<(), CacheError> {
        let cache_key = self.cache_key(&key)?;
        self.store.delete(&cache_key).await?;
        debug!(key = %cache_key, "invalidated");
        Ok(())
    }

    async fn coordinate(
        &self,
        key: &dyn Keyable,
        action: ActionRef<'_, T, E>,
    ) -> Result<T, Failure<T, E>> {
        let cache_key = self
            .cache_key(key)
            .map_err(|error| Failure::pre(ErrorCategory::Key, error))?;

        // Fast path: a hit never touches the locker.
        match self.fetch(&cache_key).await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_not_found() => {}
            Err(error) => return Err(Failure::pre(ErrorCategory::Get, error)),
        }

        let lock_key = format!("{LOCK_PREFIX}{cache_key}");
        let lock = self
            .locker
            .obtain(&lock_key)
            .await
            .map_err(|error| Failure::pre(ErrorCategory::Lock, error.into()))?;
        debug!(key = %lock_key, "lock acquired");

        let outcome = self.load(&cache_key, action).await;

        match lock.release().await {
            Ok(()) => debug!(key = %lock_key, "lock released"),
            Err(error) => warn!(key = %lock_key, error = %error, "failed to release lock"),
        }

        outcome
    }

    /// The section guarded by the lock: one more probe, then the action
    /// and the conditional store.
    async fn load(
        &self,
        cache_key: &str,
        action: ActionRef<'_, T, E>,
    ) -> Result<T, Failure<T, E>> {
        // Contenders that queued on the lock find the winner's value here.
        match self.fetch(cache_key).await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_not_found() => {}
            Err(error) => return Err(Failure::pre(ErrorCategory::Get, error)),
        }

        debug!(key = %cache_key, "performing action");
        let result = action.invoke().await.map_err(Failure::Action)?;

        match self.store_result(cache_key, &result).await {
            Ok(()) => Ok(result.value),
            Err(error) => Err(Failure::Post { result, error }),
        }
    }

    async fn fetch(&self, cache_key: &str) -> Result<T, CacheError> {
        let data = self.store.get(cache_key).await?;
        let value = self.codec.unmarshal(&data)?;
        debug!(key = %cache_key, "got cached value");
        Ok(value)
    }

    async fn store_result(
        &self,
        cache_key: &str,
        result: &ActionResult<T>,
    ) -> Result<(), CacheError> {
        if !result.cache {
            debug!(key = %cache_key, "not caching");
            return Ok(());
        }

        let ttl = result.ttl.filter(|ttl| !ttl.is_zero()).unwrap_or(self.ttl);
        if ttl.is_zero() {
            debug!(key = %cache_key, "no ttl to store under, not caching");
            return Ok(());
        }

        let data = self.codec.marshal(&result.value)?;
        self.store.set(cache_key, ttl, data).await?;
        debug!(key = %cache_key, ttl_ms = ttl.as_millis() as u64, "stored value");
        Ok(())
    }

    fn cache_key(&self, key: &dyn Keyable) -> Result<String, CacheError> {
        let derived = key.key()?;
        Ok(format!("{}{KEY_SEPARATOR}{derived}", self.name))
    }
}

/// Shared backends from which per-namespace actors are minted.
pub struct Manager {
    store: Arc<dyn Store>,
    locker: Arc<dyn Locker>,
}

impl Manager {
    pub fn new(store: Arc<dyn Store>, locker: Arc<dyn Locker>) -> Self {
        Self { store, locker }
    }

    /// Build a manager over a single backend implementing both contracts.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: Store + Locker + 'static,
    {
        Self {
            store: backend.clone(),
            locker: backend,
        }
    }

    /// Actor for `name` with JSON payloads.
    pub fn actor<T, E>(&self, name: impl Into<String>) -> Actor<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        E: Send + 'static,
    {
        self.actor_with_codec(name, Arc::new(JsonCodec))
    }

    /// Actor for `name` with an explicit codec.
    pub fn actor_with_codec<T, E>(
        &self,
        name: impl Into<String>,
        codec: Arc<dyn Codec<T>>,
    ) -> Actor<T, E>
    where
        T: Send + Sync + 'static,
        E: Send + 'static,
    {
        Actor::new(
            name,
            Arc::clone(&self.store),
            Arc::clone(&self.locker),
            codec,
        )
    }
}
