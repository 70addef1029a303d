//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with LRU tracking, TTL
//! staleness and optional size accounting.

use std::borrow::Borrow;
use std::cell::Cell;
use std::collections::HashMap;
use std::hash::Hash;
use std::mem;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info};

use crate::cache::entry::{normalize_ttl, CacheEntry};
use crate::cache::lru::{self, LruTracker};
use crate::cache::options::{
    DisposeAfter, DisposeReason, FetchMethod, GetOptions, HasOptions, Hooks, PeekOptions,
    RemainingTtl, SetOptions,
};
use crate::cache::snapshot::EntrySnapshot;
use crate::cache::stats::CacheStats;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Clock ==
/// Clock that may reuse a reading for up to `resolution`.
#[derive(Debug)]
struct Clock {
    resolution: Duration,
    cached: Cell<Option<Instant>>,
}

impl Clock {
    fn new(resolution: Duration) -> Self {
        Self {
            resolution,
            cached: Cell::new(None),
        }
    }

    fn now(&self) -> Instant {
        let real = Instant::now();
        if self.resolution.is_zero() {
            return real;
        }
        match self.cached.get() {
            Some(cached) if real.saturating_duration_since(cached) < self.resolution => cached,
            _ => {
                self.cached.set(Some(real));
                real
            }
        }
    }
}

// == LRU Store ==
/// Bounded key-value store with LRU eviction, TTL staleness and size limits.
///
/// The store is single-owner (`&mut self`); wrap it in a
/// [`SharedCache`](crate::cache::SharedCache) to share it between tasks.
///
/// Recency: `set` and `get` move an entry to the most recently used end;
/// `has`, `peek`, `find` and all iteration leave the order untouched.
pub struct LruStore<K, V> {
    /// Key-value storage
    entries: HashMap<K, CacheEntry<V>>,
    /// LRU access tracker
    lru: LruTracker<K>,
    /// Performance statistics
    stats: CacheStats,
    /// Sum of all entry sizes
    calculated_size: usize,
    config: CacheConfig,
    hooks: Hooks<K, V>,
    clock: Clock,
    /// Entries waiting for `dispose_after`
    disposed: Vec<(V, K, DisposeReason)>,
    /// Leave `disposed` for the owner to drain after releasing its lock
    defer_dispose_after: bool,
}

impl<K, V> LruStore<K, V>
where
    K: Hash + Eq + Clone,
{
    // == Constructor ==
    /// Creates a new store without callbacks.
    ///
    /// # Errors
    /// `CacheError::Unbounded` when none of `max`, `max_size` or `ttl` is set.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_hooks(config, Hooks::default())
    }

    /// Creates a new store with the given callbacks.
    ///
    /// A `max`, `max_size` or `max_entry_size` of zero is read as "unset".
    pub fn with_hooks(mut config: CacheConfig, hooks: Hooks<K, V>) -> Result<Self> {
        config.max = config.max.filter(|max| *max > 0);
        config.max_size = config.max_size.filter(|size| *size > 0);
        config.max_entry_size = config.max_entry_size.filter(|size| *size > 0);
        config.ttl = normalize_ttl(config.ttl);

        if config.max.is_none() && config.max_size.is_none() && config.ttl.is_none() {
            return Err(CacheError::Unbounded);
        }

        info!(
            "LRU store initialized: max={:?}, max_size={:?}, max_entry_size={:?}, ttl={:?}",
            config.max,
            config.max_size,
            config.entry_size_limit(),
            config.ttl
        );

        Ok(Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            calculated_size: 0,
            clock: Clock::new(config.ttl_resolution),
            config,
            hooks,
            disposed: Vec::new(),
            defer_dispose_after: false,
        })
    }

    // == Has ==
    /// Returns true if `key` is present and not stale.
    ///
    /// Stale entries count as present only with `allow_stale`. With
    /// `update_age_on_has` a fresh entry's TTL restarts. Recency is untouched.
    pub fn has<Q>(&mut self, key: &Q, opts: &HasOptions) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        let allow_stale = opts.allow_stale.unwrap_or(self.config.allow_stale);
        let update_age = opts
            .update_age_on_has
            .unwrap_or(self.config.update_age_on_has);

        match self.entries.get_mut(key) {
            None => false,
            Some(entry) if entry.is_stale(now) => allow_stale,
            Some(entry) => {
                if update_age {
                    entry.reset_age(now);
                }
                true
            }
        }
    }

    // == Peek ==
    /// Returns the value without touching recency or TTL.
    ///
    /// Stale entries are returned only with `allow_stale`, and are never deleted.
    pub fn peek<Q>(&self, key: &Q, opts: &PeekOptions) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let allow_stale = opts.allow_stale.unwrap_or(self.config.allow_stale);
        let entry = self.entries.get(key)?;
        if !allow_stale && entry.is_stale(self.clock.now()) {
            return None;
        }
        Some(&entry.value)
    }

    // == Set ==
    /// Stores a value, evicting least recently used entries as needed.
    ///
    /// Overwriting keeps the key's position rules (it becomes most recently
    /// used), disposes the old value unless `no_dispose_on_set`, and restarts
    /// the TTL unless `no_update_ttl`. A TTL of zero stores the entry without
    /// a TTL even if the store has a default.
    ///
    /// An entry larger than `max_entry_size` is not stored, and any existing
    /// value under the same key is removed.
    ///
    /// # Errors
    /// - `CacheError::MissingSize` when sizes are tracked and none can be determined
    /// - `CacheError::InvalidSize` when the determined size is zero
    pub fn set(&mut self, key: K, value: V, opts: &SetOptions<K, V>) -> Result<()> {
        let now = self.clock.now();
        let size = self.resolve_size(&key, &value, opts)?;

        if let Some(limit) = self.config.entry_size_limit() {
            if size > limit {
                debug!(size, limit, "Entry exceeds max_entry_size, not stored");
                if let Some((key, entry)) = self.take_entry(&key) {
                    self.dispose(key, entry.value, DisposeReason::Set);
                }
                self.finish();
                return Ok(());
            }
        }

        let ttl = normalize_ttl(opts.ttl.or(self.config.ttl));
        let start = opts.start.unwrap_or(now);
        let no_update_ttl = opts.no_update_ttl.unwrap_or(self.config.no_update_ttl);
        let no_dispose_on_set = opts
            .no_dispose_on_set
            .unwrap_or(self.config.no_dispose_on_set);

        let replaced = match self.entries.get_mut(&key) {
            Some(entry) => {
                let old_value = mem::replace(&mut entry.value, value);
                let old_size = mem::replace(&mut entry.size, size);
                if !no_update_ttl {
                    entry.ttl = ttl;
                    entry.start = start;
                }
                let node = entry.node;
                self.lru.touch(node);
                self.calculated_size = self.calculated_size - old_size + size;
                if no_dispose_on_set {
                    None
                } else {
                    Some(old_value)
                }
            }
            None => {
                self.make_room(size);
                let node = self.lru.push_front(key.clone());
                self.entries
                    .insert(key.clone(), CacheEntry::new(value, size, ttl, start, node));
                self.calculated_size += size;
                None
            }
        };

        if let Some(old_value) = replaced {
            self.dispose(key, old_value, DisposeReason::Set);
        }

        // An overwrite can grow the entry past max_size.
        self.enforce_max_size();
        self.finish();
        Ok(())
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether something was removed.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = match self.take_entry(key) {
            Some((key, entry)) => {
                self.dispose(key, entry.value, DisposeReason::Delete);
                true
            }
            None => false,
        };
        self.finish();
        removed
    }

    // == Clear ==
    /// Removes every entry, disposing each from least to most recently used.
    pub fn clear(&mut self) {
        while let Some(key) = self.lru.evict_oldest() {
            if let Some(entry) = self.entries.remove(&key) {
                self.dispose(key, entry.value, DisposeReason::Delete);
            }
        }
        self.entries.clear();
        self.lru.clear();
        self.calculated_size = 0;
        self.finish();
    }

    // == Purge Stale ==
    /// Removes all stale entries. Returns whether any were removed.
    pub fn purge_stale(&mut self) -> bool {
        let now = self.clock.now();
        let stale: Vec<K> = self
            .lru
            .iter_rev()
            .filter(|(_, key)| {
                self.entries
                    .get(*key)
                    .map(|entry| entry.is_stale(now))
                    .unwrap_or(false)
            })
            .map(|(_, key)| key.clone())
            .collect();

        let count = stale.len();
        for key in stale {
            if let Some((key, entry)) = self.take_entry(&key) {
                self.dispose(key, entry.value, DisposeReason::Expire);
            }
        }

        if count > 0 {
            debug!("Purged {} stale entries", count);
        }
        self.finish();
        count > 0
    }

    // == Remaining TTL ==
    /// Returns how long `key` has left before going stale. Never mutates state.
    pub fn remaining_ttl<Q>(&self, key: &Q) -> RemainingTtl
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.entries.get(key) {
            Some(entry) => entry.remaining_ttl(self.clock.now()),
            None => RemainingTtl::Absent,
        }
    }

    // == Find ==
    /// Returns the first value, most recently used first, matching `predicate`.
    ///
    /// Does not change recency. Stale entries are skipped unless `allow_stale`.
    pub fn find<F>(&self, mut predicate: F, opts: &PeekOptions) -> Option<&V>
    where
        F: FnMut(&V, &K) -> bool,
    {
        let allow_stale = opts.allow_stale.unwrap_or(self.config.allow_stale);
        self.scan(self.lru.iter(), allow_stale)
            .find(|(key, value)| predicate(value, key))
            .map(|(_, value)| value)
    }

    // == For Each ==
    /// Visits entries from most to least recently used.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&V, &K),
    {
        for (key, value) in self.entries() {
            f(value, key);
        }
    }

    /// Visits entries from least to most recently used.
    pub fn rfor_each<F>(&self, mut f: F)
    where
        F: FnMut(&V, &K),
    {
        for (key, value) in self.rentries() {
            f(value, key);
        }
    }

    // == Iteration ==
    /// Lazily yields `(key, value)` from most to least recently used.
    ///
    /// Stale entries are skipped unless the store allows stale reads.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.scan(self.lru.iter(), self.config.allow_stale)
    }

    /// Like [`entries`](Self::entries), least recently used first.
    pub fn rentries(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.scan(self.lru.iter_rev(), self.config.allow_stale)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries().map(|(key, _)| key)
    }

    pub fn rkeys(&self) -> impl Iterator<Item = &K> + '_ {
        self.rentries().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.entries().map(|(_, value)| value)
    }

    pub fn rvalues(&self) -> impl Iterator<Item = &V> + '_ {
        self.rentries().map(|(_, value)| value)
    }

    // == Accessors ==
    /// Returns the current number of entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the sum of all entry sizes.
    pub fn calculated_size(&self) -> usize {
        self.calculated_size
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_totals(self.entries.len(), self.calculated_size);
        stats
    }

    /// Returns the effective configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub(crate) fn fetch_method(&self) -> Option<FetchMethod<K, V>> {
        self.hooks.fetch_method.clone()
    }

    /// Returns true when `key` is present, stale or not.
    pub(crate) fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    // == Internals ==
    fn scan<'a>(
        &'a self,
        order: lru::Iter<'a, K>,
        allow_stale: bool,
    ) -> impl Iterator<Item = (&'a K, &'a V)> + 'a {
        let now = self.clock.now();
        order.filter_map(move |(_, key)| {
            let entry = self.entries.get(key)?;
            if !allow_stale && entry.is_stale(now) {
                return None;
            }
            Some((key, &entry.value))
        })
    }

    fn resolve_size(&self, key: &K, value: &V, opts: &SetOptions<K, V>) -> Result<usize> {
        if !self.config.tracks_size() {
            return Ok(0);
        }

        let size = match opts.size {
            Some(size) => size,
            None => match opts
                .size_calculation
                .as_ref()
                .or(self.hooks.size_calculation.as_ref())
            {
                Some(calculate) => calculate(value, key),
                None => return Err(CacheError::MissingSize),
            },
        };

        if size == 0 {
            return Err(CacheError::InvalidSize);
        }
        Ok(size)
    }

    /// Evicts until one more entry of `size` fits both bounds.
    fn make_room(&mut self, size: usize) {
        if let Some(max) = self.config.max {
            while self.entries.len() >= max {
                if !self.evict_one() {
                    break;
                }
            }
        }
        if let Some(max_size) = self.config.max_size {
            while self.calculated_size + size > max_size {
                if !self.evict_one() {
                    break;
                }
            }
        }
    }

    fn enforce_max_size(&mut self) {
        if let Some(max_size) = self.config.max_size {
            while self.calculated_size > max_size && self.entries.len() > 1 {
                if !self.evict_one() {
                    break;
                }
            }
        }
    }

    fn evict_one(&mut self) -> bool {
        match self.pop_oldest() {
            Some((key, value)) => {
                self.dispose(key, value, DisposeReason::Evict);
                true
            }
            None => false,
        }
    }

    fn pop_oldest(&mut self) -> Option<(K, V)> {
        let key = self.lru.evict_oldest()?;
        let entry = self.entries.remove(&key)?;
        self.calculated_size -= entry.size;
        debug!(size = entry.size, "Evicted least recently used entry");
        Some((key, entry.value))
    }

    fn take_entry<Q>(&mut self, key: &Q) -> Option<(K, CacheEntry<V>)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (key, entry) = self.entries.remove_entry(key)?;
        self.lru.remove(entry.node);
        self.calculated_size -= entry.size;
        Some((key, entry))
    }

    fn dispose(&mut self, key: K, value: V, reason: DisposeReason) {
        self.stats.record_removal(reason);
        if let Some(dispose) = &self.hooks.dispose {
            dispose(&value, &key, reason);
        }
        if self.hooks.dispose_after.is_some() {
            self.disposed.push((value, key, reason));
        }
    }

    /// Runs `dispose_after` for everything removed by the finished operation.
    fn finish(&mut self) {
        if self.disposed.is_empty() || self.defer_dispose_after {
            return;
        }
        let disposed = mem::take(&mut self.disposed);
        if let Some(dispose_after) = self.hooks.dispose_after.clone() {
            for (value, key, reason) in disposed {
                dispose_after(value, key, reason);
            }
        }
    }
}

impl<K, V> LruStore<K, V> {
    /// Hands `dispose_after` calls to the caller instead of running them.
    pub(crate) fn defer_dispose_after(&mut self) {
        self.defer_dispose_after = true;
    }

    /// Drains removals queued while `dispose_after` is deferred.
    pub(crate) fn take_disposed(
        &mut self,
    ) -> Option<(DisposeAfter<K, V>, Vec<(V, K, DisposeReason)>)> {
        if self.disposed.is_empty() {
            return None;
        }
        let disposed = mem::take(&mut self.disposed);
        self.hooks
            .dispose_after
            .clone()
            .map(|dispose_after| (dispose_after, disposed))
    }
}

impl<K, V> LruStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    // == Get ==
    /// Retrieves a value by key.
    ///
    /// A fresh entry becomes most recently used (and restarts its TTL with
    /// `update_age_on_get`). A stale entry is returned only with
    /// `allow_stale`, and is deleted unless `no_delete_on_stale_get`.
    pub fn get<Q>(&mut self, key: &Q, opts: &GetOptions) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        let allow_stale = opts.allow_stale.unwrap_or(self.config.allow_stale);
        let update_age = opts
            .update_age_on_get
            .unwrap_or(self.config.update_age_on_get);
        let no_delete_on_stale = opts
            .no_delete_on_stale_get
            .unwrap_or(self.config.no_delete_on_stale_get);

        let stale = match self.entries.get(key) {
            Some(entry) => entry.is_stale(now),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if stale {
            let value = if no_delete_on_stale {
                self.entries.get(key).map(|entry| entry.value.clone())
            } else {
                let removed = self.take_entry(key);
                removed.map(|(key, entry)| {
                    let value = entry.value.clone();
                    self.dispose(key, entry.value, DisposeReason::Expire);
                    value
                })
            };
            self.finish();

            return if allow_stale && value.is_some() {
                self.stats.record_hit();
                value
            } else {
                self.stats.record_miss();
                None
            };
        }

        let entry = self.entries.get_mut(key)?;
        if update_age {
            entry.reset_age(now);
        }
        let value = entry.value.clone();
        let node = entry.node;
        self.lru.touch(node);
        self.stats.record_hit();
        Some(value)
    }

    // == Pop ==
    /// Removes and returns the least recently used value.
    pub fn pop(&mut self) -> Option<V> {
        let (key, value) = self.pop_oldest()?;
        let result = value.clone();
        self.dispose(key, value, DisposeReason::Evict);
        self.finish();
        Some(result)
    }

    // == Dump ==
    /// Snapshots every entry, stale ones included, least recently used first.
    ///
    /// Feeding the result to [`load`](Self::load) rebuilds the same recency order.
    pub fn dump(&self) -> Vec<(K, EntrySnapshot<V>)> {
        let now = self.clock.now();
        let wall_now = Utc::now();
        self.lru
            .iter_rev()
            .filter_map(|(_, key)| {
                let entry = self.entries.get(key)?;
                Some((key.clone(), EntrySnapshot::capture(entry, now, wall_now)))
            })
            .collect()
    }

    // == Load ==
    /// Replaces the contents with `entries`, inserted in the given order.
    ///
    /// The last entry ends up most recently used. Bounds still apply.
    pub fn load<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, EntrySnapshot<V>)>,
    {
        self.clear();

        let now = self.clock.now();
        let wall_now = Utc::now();
        for (key, snapshot) in entries {
            let opts = SetOptions {
                ttl: Some(snapshot.ttl().unwrap_or(Duration::ZERO)),
                size: (snapshot.size > 0).then_some(snapshot.size),
                start: Some(snapshot.start_instant(now, wall_now)),
                ..SetOptions::default()
            };
            self.set(key, snapshot.value, &opts)?;
        }
        Ok(())
    }
}

impl<K, V> std::fmt::Debug for LruStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruStore")
            .field("len", &self.entries.len())
            .field("calculated_size", &self.calculated_size)
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .finish()
    }
}
