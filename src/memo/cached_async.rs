//! Asynchronous memoization wrapper with in-flight deduplication.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

use crate::cache::{LruStore, PeekOptions, SetOptions, WeakCache};
use crate::memo::key::member_key;
use crate::memo::options::{CacheOptions, MemberOptions};
use crate::memo::scope::CacheTarget;
use crate::memo::slot::{InFlight, MemoCache, Slot};

/// The wrapped async member. The returned future must own everything it uses.
pub type AsyncMethod<T, A, V, E> =
    Arc<dyn Fn(&T, A) -> BoxFuture<'static, Result<V, E>> + Send + Sync>;

/// What a call found under its key.
enum Lookup<V, E> {
    Hit(V),
    Await(InFlight<V, E>),
}

// == Cached Async Fn ==
/// Memoizes an async member.
///
/// The computation is stored in the cache as soon as it is started, so every
/// caller arriving before it settles awaits the same result. Once settled:
/// - success replaces the in-flight entry with the value (or deletes it when
///   `cache_promise_result` is off)
/// - failure is deleted with `delete_rejected_promise`, otherwise it stays and
///   later calls replay the same error until it goes stale
///
/// The original is called while the store is locked; it must not touch the
/// cache before its future is first polled.
pub struct CachedAsyncFn<T: ?Sized, A, V, E> {
    original: AsyncMethod<T, A, V, E>,
    member: String,
    options: MemberOptions<A, E>,
    cache: Option<MemoCache<V, E>>,
}

impl<T, A, V, E> CachedAsyncFn<T, A, V, E>
where
    T: CacheTarget + ?Sized,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wraps `original`. The wrapper is unbound until [`with_cache`](Self::with_cache).
    pub fn new<F>(original: F, member: impl Into<String>, options: MemberOptions<A, E>) -> Self
    where
        F: Fn(&T, A) -> BoxFuture<'static, Result<V, E>> + Send + Sync + 'static,
    {
        Self {
            original: Arc::new(original),
            member: member.into(),
            options,
            cache: None,
        }
    }

    /// Binds the wrapper to the cache it stores results in.
    pub fn with_cache(mut self, cache: MemoCache<V, E>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub async fn call(&self, target: &T, args: A) -> Result<V, E> {
        self.call_with(target, args, None).await
    }

    /// Calls with a per-call override, honored only if the member accepts one.
    pub async fn call_with(
        &self,
        target: &T,
        args: A,
        per_call: Option<&CacheOptions>,
    ) -> Result<V, E> {
        let Some(cache) = &self.cache else {
            warn!(
                "Failed to get the cache instance in method {}.{}()",
                target.class_name(),
                self.member
            );
            return (self.original)(target, args).await;
        };

        let opts = self.options.resolve(per_call);
        let key = member_key(target, &self.member, &self.options, &opts, &args)?;

        match self.lookup_or_start(cache, key, &opts, target, args) {
            Lookup::Hit(value) => Ok(value),
            Lookup::Await(in_flight) => in_flight.await,
        }
    }

    /// Checks the key and, on a miss, starts and stores the computation,
    /// all under one store lock.
    fn lookup_or_start(
        &self,
        cache: &MemoCache<V, E>,
        key: String,
        opts: &CacheOptions,
        target: &T,
        args: A,
    ) -> Lookup<V, E> {
        let mut store = cache.lock();

        if opts.returns_cached() && store.has(&key, &opts.has_options()) {
            match store.get(&key, &opts.get_options()) {
                Some(Slot::Ready(value)) => {
                    debug!(key, "Memoized value returned from cache");
                    return Lookup::Hit(value);
                }
                Some(Slot::Pending(in_flight)) => {
                    debug!(key, "Joining in-flight computation");
                    return Lookup::Await(in_flight);
                }
                None => {}
            }
        }

        debug!(key, "Memoized value missing, starting computation");
        let computation = (self.original)(target, args);
        let settle = Settle {
            cache: cache.downgrade(),
            key: key.clone(),
            opts: *opts,
        };
        let in_flight = async move {
            let result = computation.await;
            settle.apply(&result);
            result
        }
        .boxed()
        .shared();

        if opts.caches_promise() {
            if let Err(err) = store.set(key, Slot::Pending(in_flight.clone()), &opts.set_options()) {
                warn!("Failed to cache in-flight computation: {}", err);
            }
        }
        drop(store);

        // Runs to completion even if every caller stops waiting.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(in_flight.clone().map(|_| ()));
        }
        Lookup::Await(in_flight)
    }
}

// == Settlement ==
/// Write-back performed once, by whichever poll completes the computation.
struct Settle<V, E> {
    cache: WeakCache<String, Slot<V, E>>,
    key: String,
    opts: CacheOptions,
}

impl<V, E> Settle<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn apply(self, result: &Result<V, E>) {
        let Some(cache) = self.cache.upgrade() else {
            return;
        };
        let mut store = cache.lock();

        match result {
            Ok(value) if self.opts.caches_promise_result() => {
                let stored = store.set(
                    self.key,
                    Slot::Ready(value.clone()),
                    &self.opts.set_options(),
                );
                if let Err(err) = stored {
                    warn!("Failed to cache result: {}", err);
                }
            }
            Ok(_) => {
                store.delete(&self.key);
            }
            Err(_) if self.opts.deletes_rejected_promise() => {
                debug!(key = %self.key, "Dropping failed computation");
                store.delete(&self.key);
            }
            Err(_) => {
                if let Some(failure_ttl) = self.opts.failure_ttl {
                    restore_with_ttl(&mut store, self.key, failure_ttl);
                }
            }
        }
    }
}

/// Re-stores the entry under `key` as is, with a new TTL.
fn restore_with_ttl<V, E>(
    store: &mut LruStore<String, Slot<V, E>>,
    key: String,
    ttl: Duration,
) where
    V: Clone,
{
    let any = PeekOptions {
        allow_stale: Some(true),
    };
    let Some(slot) = store.peek(&key, &any).cloned() else {
        return;
    };
    let opts = SetOptions {
        ttl: Some(ttl),
        no_dispose_on_set: Some(true),
        ..SetOptions::default()
    };
    if let Err(err) = store.set(key, slot, &opts) {
        warn!("Failed to keep failed computation: {}", err);
    }
}

impl<T: ?Sized, A, V, E> fmt::Debug for CachedAsyncFn<T, A, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedAsyncFn")
            .field("member", &self.member)
            .field("options", &self.options)
            .field("bound", &self.cache.is_some())
            .finish()
    }
}
