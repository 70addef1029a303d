//! Configuration Module
//!
//! Store-wide configuration. Plain data only; callbacks live in
//! [`Hooks`](crate::cache::Hooks).

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Store configuration parameters.
///
/// These are also the lowest layer of option resolution: a per-member or
/// per-call option left unset falls back to the value here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries, `None` = no count bound
    pub max: Option<usize>,
    /// Maximum sum of entry sizes, `None` = no size bound
    pub max_size: Option<usize>,
    /// Maximum size of a single entry, defaults to `max_size`
    pub max_entry_size: Option<usize>,
    /// Default time to live, `None` = entries never go stale
    pub ttl: Option<Duration>,
    /// How long a clock reading may be reused for staleness checks
    pub ttl_resolution: Duration,
    /// Spawn a background task that purges stale entries
    pub ttl_autopurge: bool,
    /// Interval of the background purge task
    pub purge_interval: Duration,
    /// Return stale values from `get`/`has`/`peek` instead of treating them as absent
    pub allow_stale: bool,
    /// Reset an entry's age when it is read with `get`
    pub update_age_on_get: bool,
    /// Reset an entry's age when it is checked with `has`
    pub update_age_on_has: bool,
    /// Keep stale entries in place when `get` finds them
    pub no_delete_on_stale_get: bool,
    /// Skip disposal of values replaced by `set`
    pub no_dispose_on_set: bool,
    /// Keep the original TTL when overwriting an existing key
    pub no_update_ttl: bool,
    /// Keep the previous value when a fetch fails
    pub no_delete_on_fetch_rejection: bool,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `LRU_MEMO_MAX` - Maximum entries (default: 1000, `0` disables the count bound)
    /// - `LRU_MEMO_MAX_SIZE` - Maximum total size (default: unset)
    /// - `LRU_MEMO_MAX_ENTRY_SIZE` - Maximum single entry size (default: unset)
    /// - `LRU_MEMO_TTL_MS` - Default TTL in milliseconds (default: unset)
    /// - `LRU_MEMO_TTL_RESOLUTION_MS` - Clock reuse window (default: 0)
    /// - `LRU_MEMO_TTL_AUTOPURGE` - Enable the purge task (default: false)
    /// - `LRU_MEMO_PURGE_INTERVAL_MS` - Purge task interval (default: 1000)
    /// - `LRU_MEMO_ALLOW_STALE` - Serve stale entries (default: false)
    /// - `LRU_MEMO_UPDATE_AGE_ON_GET` - Refresh age on get (default: false)
    /// - `LRU_MEMO_UPDATE_AGE_ON_HAS` - Refresh age on has (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max: match env_parse::<usize>("LRU_MEMO_MAX") {
                Some(0) => None,
                Some(max) => Some(max),
                None => defaults.max,
            },
            max_size: env_parse("LRU_MEMO_MAX_SIZE").filter(|size| *size > 0),
            max_entry_size: env_parse("LRU_MEMO_MAX_ENTRY_SIZE").filter(|size| *size > 0),
            ttl: env_parse("LRU_MEMO_TTL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            ttl_resolution: env_parse("LRU_MEMO_TTL_RESOLUTION_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.ttl_resolution),
            ttl_autopurge: env_parse("LRU_MEMO_TTL_AUTOPURGE").unwrap_or(defaults.ttl_autopurge),
            purge_interval: env_parse("LRU_MEMO_PURGE_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.purge_interval),
            allow_stale: env_parse("LRU_MEMO_ALLOW_STALE").unwrap_or(defaults.allow_stale),
            update_age_on_get: env_parse("LRU_MEMO_UPDATE_AGE_ON_GET")
                .unwrap_or(defaults.update_age_on_get),
            update_age_on_has: env_parse("LRU_MEMO_UPDATE_AGE_ON_HAS")
                .unwrap_or(defaults.update_age_on_has),
            ..defaults
        }
    }

    /// Returns true when entry sizes must be tracked.
    pub fn tracks_size(&self) -> bool {
        self.max_size.is_some() || self.max_entry_size.is_some()
    }

    /// Effective per-entry size limit.
    ///
    /// `max_entry_size` falls back to `max_size` and never exceeds it, so a
    /// stored entry always fits the total budget on its own.
    pub fn entry_size_limit(&self) -> Option<usize> {
        match (self.max_entry_size, self.max_size) {
            (Some(entry), Some(total)) => Some(entry.min(total)),
            (entry, total) => entry.or(total),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max: Some(1000),
            max_size: None,
            max_entry_size: None,
            ttl: None,
            ttl_resolution: Duration::ZERO,
            ttl_autopurge: false,
            purge_interval: Duration::from_secs(1),
            allow_stale: false,
            update_age_on_get: false,
            update_age_on_has: false,
            no_delete_on_stale_get: false,
            no_dispose_on_set: false,
            no_update_ttl: false,
            no_delete_on_fetch_rejection: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
