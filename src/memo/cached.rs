//! Synchronous memoization wrapper.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::memo::key::member_key;
use crate::memo::options::{CacheOptions, MemberOptions};
use crate::memo::scope::CacheTarget;
use crate::memo::slot::{MemoCache, Slot};

/// The wrapped member: receives the target and the call arguments.
pub type SyncMethod<T, A, V, E> = Arc<dyn Fn(&T, A) -> Result<V, E> + Send + Sync>;

// == Key Locks ==
/// One lock per key currently being computed.
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    fn acquire(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.lock().entry(key.to_owned()).or_default())
    }

    fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        drop(lock);
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }
}

// == Cached Fn ==
/// Memoizes a synchronous member.
///
/// On a hit the cached value is returned; on a miss the original runs and
/// its result is stored. Errors are returned unchanged and never cached.
/// Calls for the same key are serialized so the original runs at most once
/// per miss; the original must not call back into the same key.
pub struct CachedFn<T: ?Sized, A, V, E> {
    original: SyncMethod<T, A, V, E>,
    member: String,
    options: MemberOptions<A, E>,
    cache: Option<MemoCache<V, E>>,
    locks: KeyLocks,
}

impl<T, A, V, E> CachedFn<T, A, V, E>
where
    T: CacheTarget + ?Sized,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Wraps `original`. The wrapper is unbound until [`with_cache`](Self::with_cache).
    pub fn new<F>(original: F, member: impl Into<String>, options: MemberOptions<A, E>) -> Self
    where
        F: Fn(&T, A) -> Result<V, E> + Send + Sync + 'static,
    {
        Self {
            original: Arc::new(original),
            member: member.into(),
            options,
            cache: None,
            locks: KeyLocks::default(),
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

    pub fn call(&self, target: &T, args: A) -> Result<V, E> {
        self.call_with(target, args, None)
    }

    /// Calls with a per-call override, honored only if the member accepts one.
    pub fn call_with(&self, target: &T, args: A, per_call: Option<&CacheOptions>) -> Result<V, E> {
        let Some(cache) = &self.cache else {
            warn!(
                "Failed to get the cache instance in method {}.{}()",
                target.class_name(),
                self.member
            );
            return (self.original)(target, args);
        };

        let opts = self.options.resolve(per_call);
        let key = member_key(target, &self.member, &self.options, &opts, &args)?;

        let lock = self.locks.acquire(&key);
        let result = {
            let _guard = lock.lock();
            self.lookup_or_compute(cache, &key, &opts, target, args)
        };
        self.locks.release(&key, lock);
        result
    }

    fn lookup_or_compute(
        &self,
        cache: &MemoCache<V, E>,
        key: &str,
        opts: &CacheOptions,
        target: &T,
        args: A,
    ) -> Result<V, E> {
        if opts.returns_cached() {
            let mut store = cache.lock();
            if store.has(key, &opts.has_options()) {
                match store.get(key, &opts.get_options()) {
                    Some(Slot::Ready(value)) => {
                        debug!(key, "Memoized value returned from cache");
                        return Ok(value);
                    }
                    Some(Slot::Pending(in_flight)) => {
                        // an async member is still computing this key
                        if let Some(Ok(value)) = in_flight.peek() {
                            return Ok(value.clone());
                        }
                    }
                    None => {}
                }
            }
        }

        debug!(key, "Memoized value missing, calling original");
        let value = (self.original)(target, args)?;

        if let Err(err) = cache.set(
            key.to_owned(),
            Slot::Ready(value.clone()),
            &opts.set_options(),
        ) {
            warn!("Failed to cache result of {}: {}", key, err);
        }
        Ok(value)
    }
}

impl<T: ?Sized, A, V, E> fmt::Debug for CachedFn<T, A, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFn")
            .field("member", &self.member)
            .field("options", &self.options)
            .field("bound", &self.cache.is_some())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Service {
        calls: AtomicUsize,
    }

    impl CacheTarget for Service {
        fn class_name(&self) -> &str {
            "Service"
        }
    }

    fn service() -> Service {
        Service {
            calls: AtomicUsize::new(0),
        }
    }

    fn cache() -> MemoCache<String, String> {
        MemoCache::new(CacheConfig::default()).unwrap()
    }

    fn double() -> CachedFn<Service, u32, String, String> {
        CachedFn::new(
            |svc: &Service, n: u32| {
                svc.calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err("zero".to_string())
                } else {
                    Ok((n * 2).to_string())
                }
            },
            "double",
            MemberOptions::hashed(|n: &u32| Ok(n.to_string())),
        )
    }

    #[test]
    fn test_hit_skips_original() {
        let svc = service();
        let cache = cache();
        let double = double().with_cache(cache.clone());

        assert_eq!(double.call(&svc, 4), Ok("8".to_string()));
        assert_eq!(double.call(&svc, 4), Ok("8".to_string()));
        assert_eq!(double.call(&svc, 5), Ok("10".to_string()));

        assert_eq!(svc.calls.load(Ordering::SeqCst), 2);
        assert!(cache.has(&"Service.double:4".to_string()));
    }

    #[test]
    fn test_errors_are_not_cached() {
        let svc = service();
        let cache = cache();
        let double = double().with_cache(cache.clone());

        assert_eq!(double.call(&svc, 0), Err("zero".to_string()));
        assert_eq!(double.call(&svc, 0), Err("zero".to_string()));

        assert_eq!(svc.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_hash_error_propagates_without_calling_original() {
        let svc = service();
        let failing: CachedFn<Service, u32, String, String> = CachedFn::new(
            |svc: &Service, n: u32| {
                svc.calls.fetch_add(1, Ordering::SeqCst);
                Ok(n.to_string())
            },
            "failing",
            MemberOptions::hashed(|_n: &u32| Err("cannot hash".to_string())),
        )
        .with_cache(cache());

        assert_eq!(failing.call(&svc, 1), Err("cannot hash".to_string()));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_return_cached_false_always_recomputes() {
        let svc = service();
        let counted = CachedFn::new(
            |svc: &Service, n: u32| {
                svc.calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(n.to_string())
            },
            "counted",
            MemberOptions::new(CacheOptions {
                return_cached: Some(false),
                ..CacheOptions::default()
            }),
        )
        .with_cache(cache());

        counted.call(&svc, 1).unwrap();
        counted.call(&svc, 1).unwrap();
        assert_eq!(svc.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_per_call_override_only_when_declared() {
        let svc = service();
        let cache = cache();
        let member = CachedFn::new(
            |svc: &Service, _: ()| {
                Ok::<_, String>(svc.calls.fetch_add(1, Ordering::SeqCst).to_string())
            },
            "counter",
            MemberOptions::default().with_argument_options(),
        )
        .with_cache(cache.clone());
        let bypass = CacheOptions {
            return_cached: Some(false),
            ..CacheOptions::default()
        };

        assert_eq!(member.call(&svc, ()), Ok("0".to_string()));
        assert_eq!(member.call(&svc, ()), Ok("0".to_string()));
        assert_eq!(member.call_with(&svc, (), Some(&bypass)), Ok("1".to_string()));
        assert_eq!(member.call(&svc, ()), Ok("1".to_string()));

        let ignoring = CachedFn::new(
            |svc: &Service, _: ()| {
                Ok::<_, String>(svc.calls.fetch_add(1, Ordering::SeqCst).to_string())
            },
            "ignoring",
            MemberOptions::default(),
        )
        .with_cache(cache);
        let first = ignoring.call(&svc, ()).unwrap();
        assert_eq!(ignoring.call_with(&svc, (), Some(&bypass)), Ok(first));
    }

    #[test]
    fn test_member_ttl() {
        let svc = service();
        let member = CachedFn::new(
            |svc: &Service, _: ()| Ok::<_, String>(svc.calls.fetch_add(1, Ordering::SeqCst)),
            "ticks",
            MemberOptions::ttl(Duration::from_millis(30)),
        )
        .with_cache(MemoCache::new(CacheConfig::default()).unwrap());

        assert_eq!(member.call(&svc, ()), Ok(0));
        assert_eq!(member.call(&svc, ()), Ok(0));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(member.call(&svc, ()), Ok(1));
    }

    #[test]
    fn test_unbound_wrapper_calls_original() {
        let svc = service();
        let double = double();

        assert_eq!(double.call(&svc, 2), Ok("4".to_string()));
        assert_eq!(double.call(&svc, 2), Ok("4".to_string()));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_parallel_callers_compute_once() {
        let svc = Arc::new(service());
        let slow = Arc::new(
            CachedFn::new(
                |svc: &Service, _: ()| {
                    svc.calls.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    Ok::<_, String>("done".to_string())
                },
                "slow",
                MemberOptions::default(),
            )
            .with_cache(cache()),
        );

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let svc = Arc::clone(&svc);
                let slow = Arc::clone(&slow);
                std::thread::spawn(move || slow.call(&svc, ()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok("done".to_string()));
        }

        assert_eq!(svc.calls.load(Ordering::SeqCst), 1);
        assert!(slow.locks.locks.lock().is_empty());
    }
}
