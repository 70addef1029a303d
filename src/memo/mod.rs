//! Memoization Module
//!
//! Wraps members of a [`CacheTarget`] so their results are served from a
//! [`MemoCache`].
//!
//! # Example
//! ```ignore
//! let cache: MemoCache<User, Arc<anyhow::Error>> = MemoCache::new(CacheConfig::default())?;
//! let find_user = CachedAsyncFn::new(
//!     |repo: &UserRepo, id: u64| repo.load(id).boxed(),
//!     "find_user",
//!     MemberOptions::hashed(|id: &u64| Ok(id.to_string())),
//! )
//! .with_cache(cache);
//!
//! let user = find_user.call(&repo, 42).await?;
//! ```

mod cached;
mod cached_async;
mod key;
mod options;
mod scope;
mod slot;

pub use cached::{CachedFn, SyncMethod};
pub use cached_async::{AsyncMethod, CachedAsyncFn};
pub use key::build_key;
pub use options::{CacheOptions, HashFunction, MemberOptions};
pub use scope::{CacheTarget, InstanceId, InstanceRegistry};
pub use slot::{InFlight, MemoCache, Slot};
