//! LRU Memo - In-process memoization on a bounded LRU cache
//!
//! Provides an LRU store with TTL staleness and size limits, and wrappers
//! that memoize sync and async members on top of it, deduplicating
//! concurrent async calls.

pub mod cache;
pub mod config;
pub mod error;
pub mod memo;
pub mod tasks;

pub use cache::{LruStore, SharedCache};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use memo::{CacheOptions, CacheTarget, CachedAsyncFn, CachedFn, MemberOptions, MemoCache};
pub use tasks::spawn_purge_task;
