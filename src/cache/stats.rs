//! Cache Statistics Module
//!
//! Lookup counters plus one removal counter per [`DisposeReason`] that ends
//! an entry's life.

use serde::Serialize;

use crate::cache::options::DisposeReason;

// == Cache Stats ==
/// Counters and gauges for one store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// `get` calls that returned a value
    pub hits: u64,
    /// `get` calls that found nothing usable (missing or stale)
    pub misses: u64,
    /// Entries removed to satisfy `max`/`max_size`, or by `pop`
    pub evictions: u64,
    /// Stale entries removed by `get` or `purge_stale`
    pub expirations: u64,
    /// Entries removed by `delete` or `clear`
    pub deletions: u64,
    /// Entries in the store, stale ones included
    pub total_entries: usize,
    /// Sum of entry sizes
    pub calculated_size: usize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of `get` calls that hit, 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Counts a removal by its reason. Overwrites (`Set`) are not removals.
    pub fn record_removal(&mut self, reason: DisposeReason) {
        match reason {
            DisposeReason::Evict => self.evictions += 1,
            DisposeReason::Expire => self.expirations += 1,
            DisposeReason::Delete => self.deletions += 1,
            DisposeReason::Set => {}
        }
    }

    // == Gauges ==
    pub fn set_totals(&mut self, entries: usize, calculated_size: usize) {
        self.total_entries = entries;
        self.calculated_size = calculated_size;
    }
}
