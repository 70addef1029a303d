//! TTL Purge Task
//!
//! Background task that periodically removes stale cache entries.

use std::hash::Hash;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::SharedCache;

/// Spawns a background task that periodically purges stale entries.
///
/// The task holds only a weak handle and stops on its own once every
/// [`SharedCache`] clone has been dropped. The store lock is held only for
/// the purge itself.
///
/// # Arguments
/// * `cache` - Cache to purge
/// * `interval` - Time between purge runs
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort it early.
///
/// # Example
/// ```ignore
/// let cache = SharedCache::new(config)?;
/// let purge_handle = spawn_purge_task(&cache, Duration::from_secs(1));
/// // Later, during shutdown:
/// purge_handle.abort();
/// ```
pub fn spawn_purge_task<K, V>(cache: &SharedCache<K, V>, interval: Duration) -> JoinHandle<()>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    let weak = cache.downgrade();

    tokio::spawn(async move {
        info!("Starting TTL purge task with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let Some(cache) = weak.upgrade() else {
                debug!("Cache dropped, stopping TTL purge task");
                break;
            };

            let removed = {
                let mut store = cache.lock();
                let before = store.len();
                store.purge_stale();
                before - store.len()
            };

            if removed > 0 {
                info!("TTL purge: removed {} stale entries", removed);
            } else {
                debug!("TTL purge: no stale entries found");
            }
        }
    })
}
