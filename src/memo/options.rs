//! Option Resolver
//!
//! Three layers, later ones winning field by field: the store's
//! [`CacheConfig`](crate::config::CacheConfig), the options a member declares,
//! and an optional per-call override.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{GetOptions, HasOptions, SetOptions};

/// Turns call arguments into the key suffix.
pub type HashFunction<A, E> = Arc<dyn Fn(&A) -> Result<String, E> + Send + Sync>;

// == Cache Options ==
/// Memoization options. `None` means "inherit from the layer below".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOptions {
    pub ttl: Option<Duration>,
    pub size: Option<usize>,
    pub allow_stale: Option<bool>,
    pub update_age_on_get: Option<bool>,
    pub update_age_on_has: Option<bool>,
    pub no_delete_on_stale_get: Option<bool>,
    pub no_dispose_on_set: Option<bool>,
    pub no_update_ttl: Option<bool>,
    /// Consult the cache before calling the original (default true)
    pub return_cached: Option<bool>,
    /// Ignore the instance id when building keys (default false)
    pub use_shared_cache: Option<bool>,
    /// Store the in-flight computation right away (default true)
    pub cache_promise: Option<bool>,
    /// Replace the in-flight computation with its result (default true)
    pub cache_promise_result: Option<bool>,
    /// Drop a failed computation so the next call retries (default false)
    pub delete_rejected_promise: Option<bool>,
    /// TTL a kept failure is re-stored with, unset keeps the original TTL
    pub failure_ttl: Option<Duration>,
}

impl CacheOptions {
    /// Field-wise merge, set fields of `over` win.
    pub fn merge(&self, over: &CacheOptions) -> CacheOptions {
        CacheOptions {
            ttl: over.ttl.or(self.ttl),
            size: over.size.or(self.size),
            allow_stale: over.allow_stale.or(self.allow_stale),
            update_age_on_get: over.update_age_on_get.or(self.update_age_on_get),
            update_age_on_has: over.update_age_on_has.or(self.update_age_on_has),
            no_delete_on_stale_get: over.no_delete_on_stale_get.or(self.no_delete_on_stale_get),
            no_dispose_on_set: over.no_dispose_on_set.or(self.no_dispose_on_set),
            no_update_ttl: over.no_update_ttl.or(self.no_update_ttl),
            return_cached: over.return_cached.or(self.return_cached),
            use_shared_cache: over.use_shared_cache.or(self.use_shared_cache),
            cache_promise: over.cache_promise.or(self.cache_promise),
            cache_promise_result: over.cache_promise_result.or(self.cache_promise_result),
            delete_rejected_promise: over
                .delete_rejected_promise
                .or(self.delete_rejected_promise),
            failure_ttl: over.failure_ttl.or(self.failure_ttl),
        }
    }

    pub fn returns_cached(&self) -> bool {
        self.return_cached.unwrap_or(true)
    }

    pub fn uses_shared_cache(&self) -> bool {
        self.use_shared_cache.unwrap_or(false)
    }

    pub fn caches_promise(&self) -> bool {
        self.cache_promise.unwrap_or(true)
    }

    pub fn caches_promise_result(&self) -> bool {
        self.cache_promise_result.unwrap_or(true)
    }

    pub fn deletes_rejected_promise(&self) -> bool {
        self.delete_rejected_promise.unwrap_or(false)
    }

    // == Store Options ==
    pub fn has_options(&self) -> HasOptions {
        HasOptions {
            allow_stale: self.allow_stale,
            update_age_on_has: self.update_age_on_has,
        }
    }

    pub fn get_options(&self) -> GetOptions {
        GetOptions {
            allow_stale: self.allow_stale,
            update_age_on_get: self.update_age_on_get,
            no_delete_on_stale_get: self.no_delete_on_stale_get,
        }
    }

    pub fn set_options<K, V>(&self) -> SetOptions<K, V> {
        SetOptions {
            ttl: self.ttl,
            size: self.size,
            no_dispose_on_set: self.no_dispose_on_set,
            no_update_ttl: self.no_update_ttl,
            ..SetOptions::default()
        }
    }
}

// == Member Options ==
/// Options declared once for a memoized member.
pub struct MemberOptions<A, E> {
    pub options: CacheOptions,
    /// Appends a hash of the arguments to the key
    pub hash_function: Option<HashFunction<A, E>>,
    /// Honor per-call overrides passed to `call_with`
    pub use_argument_options: bool,
}

impl<A, E> MemberOptions<A, E> {
    pub fn new(options: CacheOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Member cached with a fixed TTL.
    pub fn ttl(ttl: Duration) -> Self {
        Self::new(CacheOptions {
            ttl: Some(ttl),
            ..CacheOptions::default()
        })
    }

    /// Member keyed by a hash of its arguments.
    pub fn hashed<F>(hash_function: F) -> Self
    where
        F: Fn(&A) -> Result<String, E> + Send + Sync + 'static,
    {
        Self::default().with_hash(hash_function)
    }

    pub fn with_hash<F>(mut self, hash_function: F) -> Self
    where
        F: Fn(&A) -> Result<String, E> + Send + Sync + 'static,
    {
        self.hash_function = Some(Arc::new(hash_function));
        self
    }

    pub fn with_argument_options(mut self) -> Self {
        self.use_argument_options = true;
        self
    }

    /// Options in effect for one call.
    ///
    /// `per_call` is ignored unless the member declared `use_argument_options`.
    pub fn resolve(&self, per_call: Option<&CacheOptions>) -> CacheOptions {
        match per_call {
            Some(over) if self.use_argument_options => self.options.merge(over),
            _ => self.options,
        }
    }
}

impl<A, E> Default for MemberOptions<A, E> {
    fn default() -> Self {
        Self {
            options: CacheOptions::default(),
            hash_function: None,
            use_argument_options: false,
        }
    }
}

impl<A, E> Clone for MemberOptions<A, E> {
    fn clone(&self) -> Self {
        Self {
            options: self.options,
            hash_function: self.hash_function.clone(),
            use_argument_options: self.use_argument_options,
        }
    }
}

impl<A, E> fmt::Debug for MemberOptions<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberOptions")
            .field("options", &self.options)
            .field("hash_function", &self.hash_function.is_some())
            .field("use_argument_options", &self.use_argument_options)
            .finish()
    }
}
