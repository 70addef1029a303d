//! Memoized values as stored in the cache.

use std::fmt;

use futures::future::{BoxFuture, Shared};

use crate::cache::SharedCache;

/// An async computation every caller of the same key awaits together.
pub type InFlight<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// A cached member result, or the computation that will produce it.
pub enum Slot<V, E> {
    Ready(V),
    Pending(InFlight<V, E>),
}

/// Cache shared by memoized members returning `V` or failing with `E`.
pub type MemoCache<V, E> = SharedCache<String, Slot<V, E>>;

impl<V, E> Slot<V, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending(_))
    }

    pub fn ready(&self) -> Option<&V> {
        match self {
            Slot::Ready(value) => Some(value),
            Slot::Pending(_) => None,
        }
    }
}

impl<V: Clone, E> Clone for Slot<V, E> {
    fn clone(&self) -> Self {
        match self {
            Slot::Ready(value) => Slot::Ready(value.clone()),
            Slot::Pending(in_flight) => Slot::Pending(in_flight.clone()),
        }
    }
}

impl<V: fmt::Debug, E> fmt::Debug for Slot<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Slot::Pending(_) => f.write_str("Pending"),
        }
    }
}
