//! Shared Cache Module
//!
//! Cloneable, thread-safe handle around an [`LruStore`], adding async
//! `fetch` with in-flight deduplication and the optional purge task.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::cache::options::{
    FetchMethod, FetchOptions, GetOptions, HasOptions, Hooks, PeekOptions, RemainingTtl,
    SetOptions,
};
use crate::cache::snapshot::EntrySnapshot;
use crate::cache::stats::CacheStats;
use crate::cache::store::LruStore;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_purge_task;

/// A fetch that has been started and not yet settled.
type InFlight<V> = Shared<BoxFuture<'static, Result<Option<V>>>>;

enum FetchStep<V> {
    Done(Option<V>),
    Wait(InFlight<V>),
}

struct Inner<K, V> {
    store: Mutex<LruStore<K, V>>,
    /// In-flight fetches by key. Always locked before `store`.
    pending: Mutex<HashMap<K, InFlight<V>>>,
}

// == Shared Cache ==
/// Thread-safe handle to one store. Clones share the same entries.
pub struct SharedCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

/// Exclusive access to the store of a [`SharedCache`].
///
/// `dispose_after` callbacks queued by the guarded operations run when the
/// guard is dropped, with the store unlocked, so they may use the same cache.
pub struct StoreGuard<'a, K, V> {
    guard: MutexGuard<'a, LruStore<K, V>>,
}

impl<K, V> Deref for StoreGuard<'_, K, V> {
    type Target = LruStore<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<K, V> DerefMut for StoreGuard<'_, K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<K, V> Drop for StoreGuard<'_, K, V> {
    fn drop(&mut self) {
        if let Some((dispose_after, disposed)) = self.guard.take_disposed() {
            MutexGuard::unlocked(&mut self.guard, || {
                for (value, key, reason) in disposed {
                    dispose_after(value, key, reason);
                }
            });
        }
    }
}

/// Non-owning handle, see [`SharedCache::downgrade`].
pub struct WeakCache<K, V> {
    inner: Weak<Inner<K, V>>,
}

impl<K, V> Clone for SharedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Clone for WeakCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<K, V> WeakCache<K, V> {
    pub fn upgrade(&self) -> Option<SharedCache<K, V>> {
        self.inner.upgrade().map(|inner| SharedCache { inner })
    }
}

impl<K, V> SharedCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_hooks(config, Hooks::default())
    }

    /// Builds the store and, with `ttl_autopurge`, starts the purge task.
    ///
    /// The task runs whether or not the store has a default `ttl`, so entries
    /// given a TTL per `set` are purged too.
    ///
    /// The purge task needs a Tokio runtime; outside one, stale entries are
    /// only removed lazily.
    pub fn with_hooks(config: CacheConfig, hooks: Hooks<K, V>) -> Result<Self> {
        let autopurge = config.ttl_autopurge;
        let interval = config.purge_interval;
        let cache = Self::from_store(LruStore::with_hooks(config, hooks)?);

        if autopurge {
            if tokio::runtime::Handle::try_current().is_ok() {
                spawn_purge_task(&cache, interval);
            } else {
                warn!("ttl_autopurge requested outside a Tokio runtime, purge task not started");
            }
        }
        Ok(cache)
    }

    /// Wraps an existing store.
    pub fn from_store(mut store: LruStore<K, V>) -> Self {
        store.defer_dispose_after();
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(store),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Locks the store for a sequence of operations that must not interleave
    /// with other callers.
    pub fn lock(&self) -> StoreGuard<'_, K, V> {
        StoreGuard {
            guard: self.inner.store.lock(),
        }
    }

    pub fn downgrade(&self) -> WeakCache<K, V> {
        WeakCache {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // == Store Operations ==
    pub fn has(&self, key: &K) -> bool {
        self.lock().has(key, &HasOptions::default())
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key, &GetOptions::default())
    }

    pub fn peek(&self, key: &K) -> Option<V> {
        self.lock().peek(key, &PeekOptions::default()).cloned()
    }

    pub fn set(&self, key: K, value: V, opts: &SetOptions<K, V>) -> Result<()> {
        self.lock().set(key, value, opts)
    }

    pub fn delete(&self, key: &K) -> bool {
        self.lock().delete(key)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn purge_stale(&self) -> bool {
        self.lock().purge_stale()
    }

    pub fn remaining_ttl(&self, key: &K) -> RemainingTtl {
        self.lock().remaining_ttl(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    pub fn dump(&self) -> Vec<(K, EntrySnapshot<V>)> {
        self.lock().dump()
    }

    pub fn load(&self, entries: Vec<(K, EntrySnapshot<V>)>) -> Result<()> {
        self.lock().load(entries)
    }

    // == Fetch ==
    /// Returns the cached value, calling the store's fetch method on a miss.
    ///
    /// Concurrent fetches of one key share a single call of the fetch method.
    /// With `allow_stale`, a stale value is returned right away while the
    /// refresh runs in the background. Without a fetch method this is `get`.
    ///
    /// # Errors
    /// `CacheError::Fetch` when the fetch method fails, or any error from
    /// storing the fetched value.
    pub async fn fetch(&self, key: K, opts: FetchOptions) -> Result<Option<V>> {
        let step = {
            let mut pending = self.inner.pending.lock();
            let mut store = self.lock();
            let step = self.begin_fetch(&mut pending, &mut store, key, opts);
            // store unlocks last, running dispose_after with no lock held
            drop(pending);
            step
        };

        match step {
            FetchStep::Done(value) => Ok(value),
            FetchStep::Wait(in_flight) => in_flight.await,
        }
    }

    fn begin_fetch(
        &self,
        pending: &mut HashMap<K, InFlight<V>>,
        store: &mut LruStore<K, V>,
        key: K,
        opts: FetchOptions,
    ) -> FetchStep<V> {
        let allow_stale = opts.allow_stale.unwrap_or(store.config().allow_stale);

        let Some(fetch_method) = store.fetch_method() else {
            let get = GetOptions {
                allow_stale: Some(allow_stale),
                ..GetOptions::default()
            };
            return FetchStep::Done(store.get(&key, &get));
        };

        let fresh = PeekOptions {
            allow_stale: Some(false),
        };
        if !opts.force_refresh && store.peek(&key, &fresh).is_some() {
            debug!("Fetch served from cache");
            return FetchStep::Done(store.get(&key, &GetOptions::default()));
        }

        let stale = store
            .peek(
                &key,
                &PeekOptions {
                    allow_stale: Some(true),
                },
            )
            .cloned();

        let in_flight = match pending.get(&key) {
            Some(in_flight) => in_flight.clone(),
            None => {
                let in_flight = self.start_fetch(key.clone(), stale.clone(), fetch_method, opts);
                pending.insert(key, in_flight.clone());
                in_flight
            }
        };

        if let (true, Some(stale)) = (allow_stale, stale) {
            debug!("Fetch returning stale value, refreshing in background");
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(in_flight.map(|_| ()));
            }
            return FetchStep::Done(Some(stale));
        }
        FetchStep::Wait(in_flight)
    }

    fn start_fetch(
        &self,
        key: K,
        stale: Option<V>,
        fetch_method: FetchMethod<K, V>,
        opts: FetchOptions,
    ) -> InFlight<V> {
        let weak = self.downgrade();
        async move {
            let result = fetch_method(key.clone(), stale).await;
            match weak.upgrade() {
                Some(cache) => cache.settle_fetch(key, result, &opts),
                None => result.map_err(CacheError::from),
            }
        }
        .boxed()
        .shared()
    }

    /// Writes a fetch result back. Runs once per fetch, inside the shared future.
    fn settle_fetch(
        &self,
        key: K,
        result: anyhow::Result<Option<V>>,
        opts: &FetchOptions,
    ) -> Result<Option<V>> {
        let mut pending = self.inner.pending.lock();
        let mut store = self.lock();
        pending.remove(&key);
        drop(pending);

        match result {
            Ok(Some(value)) => {
                let set = SetOptions {
                    ttl: opts.ttl,
                    size: opts.size,
                    ..SetOptions::default()
                };
                store.set(key, value.clone(), &set)?;
                Ok(Some(value))
            }
            Ok(None) => {
                store.delete(&key);
                Ok(None)
            }
            Err(err) => {
                let keep = opts
                    .no_delete_on_fetch_rejection
                    .unwrap_or(store.config().no_delete_on_fetch_rejection);
                if !keep {
                    store.delete(&key);
                }
                warn!("Fetch method failed: {err:#}");
                Err(CacheError::from(err))
            }
        }
    }
}

impl<K, V> fmt::Debug for SharedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCache")
            .field("store", &*self.inner.store.lock())
            .field("in_flight", &self.inner.pending.lock().len())
            .finish()
    }
}
