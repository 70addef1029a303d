//! Instance Scoping
//!
//! Per-type instance counters used to give isolated objects their own key
//! namespace.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

// == Instance Id ==
/// Identity of one isolated instance. Issued from 1 upwards per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn get(self) -> u64 {
        self.0
    }

    /// Shorthand for `InstanceRegistry::global().assign::<T>()`.
    pub fn next<T: 'static>() -> Self {
        InstanceRegistry::global().assign::<T>()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// == Instance Registry ==
/// Maps a type to the counter its instance ids are drawn from.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    counters: Mutex<HashMap<TypeId, Arc<AtomicU64>>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    pub fn global() -> &'static InstanceRegistry {
        static GLOBAL: OnceLock<InstanceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(InstanceRegistry::new)
    }

    /// Issues the next id for `T`. Call once per constructed instance.
    pub fn assign<T: 'static>(&self) -> InstanceId {
        let previous = self.counter::<T>().fetch_add(1, Ordering::SeqCst);
        InstanceId(previous + 1)
    }

    /// Number of ids issued for `T` so far.
    pub fn issued<T: 'static>(&self) -> u64 {
        self.counters
            .lock()
            .get(&TypeId::of::<T>())
            .map(|counter| counter.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn counter<T: 'static>(&self) -> Arc<AtomicU64> {
        Arc::clone(self.counters.lock().entry(TypeId::of::<T>()).or_default())
    }
}

// == Cache Target ==
/// An object whose methods are memoized.
///
/// Types that want a key namespace per instance return the id they were
/// given at construction from `instance_id`; everything else shares one
/// namespace per class name.
pub trait CacheTarget {
    fn class_name(&self) -> &str;

    fn instance_id(&self) -> Option<InstanceId> {
        None
    }
}
