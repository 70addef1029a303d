//! Integration Tests for the Cache Store
//!
//! Scenario tests against the public store API.

use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::Duration;

use lru_memo::cache::{
    DisposeReason, EntrySnapshot, GetOptions, HasOptions, Hooks, LruStore, SetOptions,
};
use lru_memo::{CacheConfig, CacheError, SharedCache};

fn config(max: usize) -> CacheConfig {
    CacheConfig {
        max: Some(max),
        ..Default::default()
    }
}

#[test]
fn test_pop_after_overflow() {
    let mut store: LruStore<u32, String> = LruStore::new(config(5)).unwrap();

    for key in 1..=6 {
        store.set(key, format!("v{key}"), &SetOptions::default()).unwrap();
    }

    assert_eq!(store.pop(), Some("v2".to_string()));
    assert_eq!(store.len(), 4);
}

#[test]
fn test_default_ttl_expiry() {
    let mut store: LruStore<u32, String> = LruStore::new(CacheConfig {
        max: None,
        ttl: Some(Duration::from_millis(100)),
        ..Default::default()
    })
    .unwrap();

    store.set(1, "a".into(), &SetOptions::default()).unwrap();
    assert_eq!(store.get(&1, &GetOptions::default()), Some("a".to_string()));

    sleep(Duration::from_millis(110));

    assert_eq!(store.get(&1, &GetOptions::default()), None);
}

#[test]
fn test_oversized_entry_is_not_stored() {
    let mut store: LruStore<String, String> = LruStore::new(CacheConfig {
        max_entry_size: Some(100),
        ..Default::default()
    })
    .unwrap();

    store
        .set("k".into(), "v".into(), &SetOptions::with_size(200))
        .unwrap();

    assert!(!store.has("k", &HasOptions::default()));
}

#[test]
fn test_construction_errors() {
    let unbounded: Result<LruStore<u32, u32>, _> = LruStore::new(CacheConfig {
        max: None,
        ..Default::default()
    });
    assert!(matches!(unbounded, Err(CacheError::Unbounded)));

    let mut sized: LruStore<u32, u32> = LruStore::new(CacheConfig {
        max_size: Some(10),
        ..Default::default()
    })
    .unwrap();
    assert!(matches!(
        sized.set(1, 1, &SetOptions::default()),
        Err(CacheError::MissingSize)
    ));
}

#[test]
fn test_dump_survives_json() {
    let mut store: LruStore<String, u32> = LruStore::new(config(10)).unwrap();
    store.set("a".into(), 1, &SetOptions::default()).unwrap();
    store
        .set("b".into(), 2, &SetOptions::with_ttl(Duration::from_secs(60)))
        .unwrap();

    let json = serde_json::to_string(&store.dump()).unwrap();
    let dump: Vec<(String, EntrySnapshot<u32>)> = serde_json::from_str(&json).unwrap();

    let mut restored: LruStore<String, u32> = LruStore::new(config(10)).unwrap();
    restored.load(dump).unwrap();

    let keys: Vec<&String> = restored.keys().collect();
    assert_eq!(keys, vec!["b", "a"]);
    assert!(restored.remaining_ttl("b").as_millis_f64() > 59_000.0);
}

#[test]
fn test_load_into_smaller_store_keeps_most_recent() {
    let mut source: LruStore<u32, u32> = LruStore::new(config(10)).unwrap();
    for key in 1..=10 {
        source.set(key, key, &SetOptions::default()).unwrap();
    }

    let mut target: LruStore<u32, u32> = LruStore::new(config(3)).unwrap();
    target.load(source.dump()).unwrap();

    assert_eq!(target.keys().copied().collect::<Vec<u32>>(), vec![10, 9, 8]);
}

#[test]
fn test_dispose_hooks_see_every_removal() {
    let log: Arc<Mutex<Vec<(u32, DisposeReason)>>> = Arc::default();
    let sink = Arc::clone(&log);
    let hooks = Hooks {
        dispose: Some(Arc::new(move |_v: &u32, k: &u32, reason: DisposeReason| {
            sink.lock().unwrap().push((*k, reason));
        })),
        ..Hooks::default()
    };
    let mut store = LruStore::with_hooks(config(2), hooks).unwrap();
    let short = SetOptions {
        ttl: Some(Duration::from_millis(10)),
        ..SetOptions::default()
    };

    store.set(1, 1, &SetOptions::default()).unwrap();
    store.set(2, 2, &short).unwrap();
    store.set(3, 3, &SetOptions::default()).unwrap();
    sleep(Duration::from_millis(20));
    store.purge_stale();
    store.set(3, 30, &SetOptions::default()).unwrap();
    store.clear();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            (1, DisposeReason::Evict),
            (2, DisposeReason::Expire),
            (3, DisposeReason::Set),
            (3, DisposeReason::Delete),
        ]
    );
}

#[test]
fn test_config_from_env_defaults() {
    let config = CacheConfig::from_env();
    let store: LruStore<u32, u32> = LruStore::new(config).unwrap();
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_shared_cache_between_tasks() {
    let cache: SharedCache<u32, u32> = SharedCache::new(config(100)).unwrap();

    let writers: Vec<_> = (0..4u32)
        .map(|t| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..10 {
                    cache.set(t * 10 + i, i, &SetOptions::default()).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }

    assert_eq!(cache.len(), 40);
    assert_eq!(cache.stats().total_entries, 40);
}
