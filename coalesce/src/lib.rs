//! Single-flight, read-through cache coordination.
//!
//! An [`Actor`] wraps a logical operation that computes a value for a key.
//! It returns the cached value when one exists, and otherwise executes the
//! operation exactly once across concurrent callers sharing that key,
//! stores the result if the caller consents, and returns it. The crate
//! provides:
//!
//! - The coordination flow itself: probe, key-scoped lock, double-checked
//!   probe, action, conditional store, release
//! - [`Keyable`] key derivation, including hashed mapping keys
//! - A closed error taxonomy with replaceable pre- and post-action
//!   handlers ([`PreActionErrorHandler`], [`PostActionErrorHandler`])
//! - Collaborator contracts for storage ([`Store`]), mutual exclusion
//!   ([`Locker`]) and value serialization ([`Codec`])
//! - In-process backends ([`MemoryStore`], [`MutexLocker`]) and mock
//!   collaborators for tests
//!
//! Networked backends live in companion crates; `coalesce-redis` provides
//! both contracts over Redis.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use coalesce::{ActionResult, Actor, JsonCodec, MemoryStore, MutexLocker};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let actor: Actor<u64, String> = Actor::new(
//!     "answers",
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MutexLocker::new()),
//!     Arc::new(JsonCodec),
//! );
//!
//! // The first call misses and runs the action; repeats within the TTL
//! // are served from the store without running it again.
//! let value = actor
//!     .run("life", || async { Ok(ActionResult::cached(42)) })
//!     .await
//!     .unwrap();
//! assert_eq!(value, 42);
//! # }
//! ```

pub mod actor;
pub mod codec;
pub mod error;
pub mod keyable;
pub mod lock;
pub mod memory;
pub mod mock;
pub mod store;
pub mod types;

pub use actor::{Actor, Manager, DEFAULT_TTL};
pub use codec::{Codec, JsonCodec, MsgpackCodec};
pub use error::{CacheError, CodecError, ErrorCategory, KeyError, LockError, StoreError};
pub use keyable::{Keyable, KeyableMap};
pub use lock::{Lock, Locker, MultiMutex, MultiMutexGuard, MutexLocker};
pub use memory::MemoryStore;
pub use store::Store;
pub use types::{
    ActionFuture, ActionRef, ActionResult, DefaultPostActionErrorHandler,
    DefaultPreActionErrorHandler, PostActionErrorArgs, PostActionErrorHandler,
    PreActionErrorArgs, PreActionErrorHandler,
};
