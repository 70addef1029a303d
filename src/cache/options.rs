//! Per-operation options and store callbacks.
//!
//! Every `Option` field left as `None` falls back to the store's
//! [`CacheConfig`](crate::config::CacheConfig).

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde::Serialize;

// == Callbacks ==
/// Computes the size of an entry from its value and key.
pub type SizeCalculator<K, V> = Arc<dyn Fn(&V, &K) -> usize + Send + Sync>;

/// Called while an entry is being removed from the store.
pub type Disposer<K, V> = Arc<dyn Fn(&V, &K, DisposeReason) + Send + Sync>;

/// Called with ownership of a removed entry once the store operation has finished.
///
/// Through a [`SharedCache`](crate::cache::SharedCache) it runs after the store
/// lock is released, so it may read or write the same cache.
pub type DisposeAfter<K, V> = Arc<dyn Fn(V, K, DisposeReason) + Send + Sync>;

/// Async fill-on-miss function used by `fetch`.
///
/// Receives the key and the stale value, if any. `Ok(None)` means "nothing
/// to cache" and removes the key.
pub type FetchMethod<K, V> =
    Arc<dyn Fn(K, Option<V>) -> BoxFuture<'static, anyhow::Result<Option<V>>> + Send + Sync>;

// == Dispose Reason ==
/// Why an entry left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisposeReason {
    /// Removed to satisfy `max`/`max_size`, or by `pop`
    Evict,
    /// Replaced by a `set` on the same key, or rejected as oversized
    Set,
    /// Removed by `delete`, `clear` or `load`
    Delete,
    /// Removed because it went stale
    Expire,
}

// == Hooks ==
/// Callbacks attached to a store at construction.
pub struct Hooks<K, V> {
    pub size_calculation: Option<SizeCalculator<K, V>>,
    pub dispose: Option<Disposer<K, V>>,
    pub dispose_after: Option<DisposeAfter<K, V>>,
    pub fetch_method: Option<FetchMethod<K, V>>,
}

impl<K, V> Default for Hooks<K, V> {
    fn default() -> Self {
        Self {
            size_calculation: None,
            dispose: None,
            dispose_after: None,
            fetch_method: None,
        }
    }
}

impl<K, V> Clone for Hooks<K, V> {
    fn clone(&self) -> Self {
        Self {
            size_calculation: self.size_calculation.clone(),
            dispose: self.dispose.clone(),
            dispose_after: self.dispose_after.clone(),
            fetch_method: self.fetch_method.clone(),
        }
    }
}

impl<K, V> fmt::Debug for Hooks<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("size_calculation", &self.size_calculation.is_some())
            .field("dispose", &self.dispose.is_some())
            .field("dispose_after", &self.dispose_after.is_some())
            .field("fetch_method", &self.fetch_method.is_some())
            .finish()
    }
}

// == Operation Options ==
/// Options for `has`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HasOptions {
    pub allow_stale: Option<bool>,
    pub update_age_on_has: Option<bool>,
}

/// Options for `get`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub allow_stale: Option<bool>,
    pub update_age_on_get: Option<bool>,
    pub no_delete_on_stale_get: Option<bool>,
}

/// Options for `peek` and the read-only scans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeekOptions {
    pub allow_stale: Option<bool>,
}

/// Options for `set`.
pub struct SetOptions<K, V> {
    /// TTL for this entry, overrides the store default
    pub ttl: Option<Duration>,
    /// Explicit size, skips any size calculator
    pub size: Option<usize>,
    /// Size calculator for this call, overrides the store hook
    pub size_calculation: Option<SizeCalculator<K, V>>,
    /// Instant the TTL is measured from, defaults to now
    pub start: Option<Instant>,
    pub no_dispose_on_set: Option<bool>,
    pub no_update_ttl: Option<bool>,
}

impl<K, V> SetOptions<K, V> {
    /// Shorthand for a `set` with only a TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Shorthand for a `set` with only an explicit size.
    pub fn with_size(size: usize) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }
}

impl<K, V> Default for SetOptions<K, V> {
    fn default() -> Self {
        Self {
            ttl: None,
            size: None,
            size_calculation: None,
            start: None,
            no_dispose_on_set: None,
            no_update_ttl: None,
        }
    }
}

impl<K, V> Clone for SetOptions<K, V> {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            size: self.size,
            size_calculation: self.size_calculation.clone(),
            start: self.start,
            no_dispose_on_set: self.no_dispose_on_set,
            no_update_ttl: self.no_update_ttl,
        }
    }
}

impl<K, V> fmt::Debug for SetOptions<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetOptions")
            .field("ttl", &self.ttl)
            .field("size", &self.size)
            .field("size_calculation", &self.size_calculation.is_some())
            .field("start", &self.start)
            .field("no_dispose_on_set", &self.no_dispose_on_set)
            .field("no_update_ttl", &self.no_update_ttl)
            .finish()
    }
}

/// Options for `fetch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Return a stale value right away and refresh in the background
    pub allow_stale: Option<bool>,
    /// Ignore a fresh cached value and call the fetch method anyway
    pub force_refresh: bool,
    /// TTL for the fetched value
    pub ttl: Option<Duration>,
    /// Explicit size for the fetched value
    pub size: Option<usize>,
    pub no_delete_on_fetch_rejection: Option<bool>,
}

// == Remaining TTL ==
/// Result of `remaining_ttl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingTtl {
    /// Key is not in the store
    Absent,
    /// Entry never goes stale
    Infinite,
    /// Milliseconds left, zero or negative once the entry is stale
    Finite(i64),
}

impl RemainingTtl {
    /// Milliseconds as a float: 0 when absent, +inf when infinite.
    pub fn as_millis_f64(&self) -> f64 {
        match self {
            RemainingTtl::Absent => 0.0,
            RemainingTtl::Infinite => f64::INFINITY,
            RemainingTtl::Finite(ms) => *ms as f64,
        }
    }

    /// True when the entry exists and its TTL has elapsed.
    pub fn is_expired(&self) -> bool {
        matches!(self, RemainingTtl::Finite(ms) if *ms <= 0)
    }
}
