//! Cache Module
//!
//! Provides a bounded in-memory store with LRU eviction, TTL staleness and
//! size accounting, plus a shared handle with async fetch.

mod entry;
mod lru;
mod options;
mod shared;
mod snapshot;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use lru::{LruTracker, NodeId};
pub use options::{
    DisposeAfter, DisposeReason, Disposer, FetchMethod, FetchOptions, GetOptions, HasOptions,
    Hooks, PeekOptions, RemainingTtl, SetOptions, SizeCalculator,
};
pub use shared::{SharedCache, StoreGuard, WeakCache};
pub use snapshot::EntrySnapshot;
pub use stats::CacheStats;
pub use store::LruStore;
