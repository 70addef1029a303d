//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, Instant};

use crate::cache::lru::NodeId;
use crate::cache::options::RemainingTtl;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Size accounted against `max_size`, 0 when sizes are not tracked
    pub size: usize,
    /// Time to live, None = never stale
    pub ttl: Option<Duration>,
    /// Instant the TTL is measured from
    pub start: Instant,
    /// Position in the recency list
    pub(crate) node: NodeId,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `size` - Accounted size
    /// * `ttl` - Optional TTL, a zero TTL is treated as no TTL
    /// * `start` - Instant the TTL starts counting from
    pub(crate) fn new(
        value: V,
        size: usize,
        ttl: Option<Duration>,
        start: Instant,
        node: NodeId,
    ) -> Self {
        Self {
            value,
            size,
            ttl: normalize_ttl(ttl),
            start,
            node,
        }
    }

    // == Is Stale ==
    /// Checks if the entry is stale at `now`.
    ///
    /// Boundary condition: an entry is stale once `now >= start + ttl`, so it
    /// expires the moment its TTL has fully elapsed.
    pub fn is_stale(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(self.start) >= ttl,
            None => false,
        }
    }

    // == Restart TTL ==
    /// Restarts the TTL window from `now`, keeping the TTL length.
    pub fn reset_age(&mut self, now: Instant) {
        self.start = now;
    }

    // == Time To Live ==
    /// Returns the remaining TTL at `now`.
    ///
    /// # Returns
    /// - `RemainingTtl::Infinite` if the entry has no TTL
    /// - `RemainingTtl::Finite(ms)` otherwise, negative once expired
    pub fn remaining_ttl(&self, now: Instant) -> RemainingTtl {
        match self.ttl {
            None => RemainingTtl::Infinite,
            Some(ttl) => {
                // A TTL past the end of the clock never elapses.
                let Some(expires) = self.start.checked_add(ttl) else {
                    return RemainingTtl::Infinite;
                };
                let millis = if expires >= now {
                    clamp_millis(expires.duration_since(now))
                } else {
                    -clamp_millis(now.duration_since(expires))
                };
                RemainingTtl::Finite(millis)
            }
        }
    }
}

fn clamp_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// A zero TTL means the entry never goes stale.
pub(crate) fn normalize_ttl(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|ttl| !ttl.is_zero())
}
