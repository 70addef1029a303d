//! Snapshot Module
//!
//! Serializable form of an entry used by `dump`/`load`.
//!
//! `Instant`s cannot leave the process, so the TTL start is carried as a
//! wall-clock timestamp. Loading converts it back into an age, which keeps
//! the time that passed between dump and load counted against the TTL.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::entry::CacheEntry;

// == Entry Snapshot ==
/// Everything needed to rebuild one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot<V> {
    pub value: V,
    /// TTL in milliseconds, None = never stale
    pub ttl_ms: Option<u64>,
    /// Accounted size, 0 when sizes are not tracked
    pub size: usize,
    /// Wall-clock time the TTL started counting
    pub start: DateTime<Utc>,
}

impl<V: Clone> EntrySnapshot<V> {
    /// Captures `entry` relative to the given instant and wall-clock pair.
    pub(crate) fn capture(entry: &CacheEntry<V>, now: Instant, wall_now: DateTime<Utc>) -> Self {
        let age = now.saturating_duration_since(entry.start);
        let age = chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero());

        Self {
            value: entry.value.clone(),
            ttl_ms: entry
                .ttl
                .map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
            size: entry.size,
            start: wall_now - age,
        }
    }
}

impl<V> EntrySnapshot<V> {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }

    /// Converts the wall-clock start back into an `Instant`.
    ///
    /// A start in the future is clamped to `now`.
    pub(crate) fn start_instant(&self, now: Instant, wall_now: DateTime<Utc>) -> Instant {
        let age = (wall_now - self.start).to_std().unwrap_or(Duration::ZERO);
        now.checked_sub(age).unwrap_or(now)
    }
}
