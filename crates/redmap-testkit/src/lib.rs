//! Conformance suite for redmap store backends.
//!
//! Each `run_*` function exercises one behavior through a [`Store`] and panics
//! on failure. Backend test files call every function with a fresh store:
//!
//! ```ignore
//! #[tokio::test]
//! async fn scan_is_complete() {
//!     redmap_testkit::run_scan_is_complete(Store::in_memory()).await;
//! }
//! ```
//!
//! Keys are made unique per call, so the suite can run against a live server
//! shared with other data.

use std::collections::HashSet;

use redmap::{MapConfig, RemoteMap, StringMap};
use redmap_core::{SCAN_START, Store};

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A key no other test run will use.
pub fn unique_name(prefix: &str) -> String {
    format!("redmap-test:{}:{}", prefix, uuid::Uuid::new_v4())
}

/// Field-level primitives, including their behavior on absent keys.
pub async fn run_hash_primitives(store: Store) {
    let key = unique_name("primitives");

    assert_eq!(store.hlen(&key).await.expect("hlen"), 0);
    assert!(!store.hexists(&key, "f").await.expect("hexists"));
    assert_eq!(store.hget(&key, "f").await.expect("hget"), None);
    assert!(!store.hdel(&key, "f").await.expect("hdel"));
    assert!(!store.del(&key).await.expect("del"));

    store.hset(&key, "f", "1").await.expect("hset");
    store.hset(&key, "f", "2").await.expect("hset overwrite");
    store.hset(&key, "g", "3").await.expect("hset second field");
    assert_eq!(store.hlen(&key).await.expect("hlen"), 2);
    assert!(store.hexists(&key, "f").await.expect("hexists"));
    assert_eq!(store.hget(&key, "f").await.expect("hget").as_deref(), Some("2"));

    assert!(store.hdel(&key, "f").await.expect("hdel"));
    assert_eq!(store.hlen(&key).await.expect("hlen"), 1);

    assert!(store.del(&key).await.expect("del"));
    assert_eq!(store.hlen(&key).await.expect("hlen"), 0);
}

/// Bulk set writes every pair; an empty batch changes nothing.
pub async fn run_bulk_set(store: Store) {
    let key = unique_name("bulk");
    let entries: Vec<(String, String)> = (0..10)
        .map(|i| (format!("field-{}", i), format!("value-{}", i)))
        .collect();

    store.hset_many(&key, &entries).await.expect("hset_many");
    store.hset_many(&key, &[]).await.expect("empty hset_many");
    assert_eq!(store.hlen(&key).await.expect("hlen"), 10);
    assert_eq!(
        store.hget(&key, "field-7").await.expect("hget").as_deref(),
        Some("value-7")
    );

    store.del(&key).await.expect("cleanup");
}

/// A scan driven to completion returns every field exactly once.
pub async fn run_scan_is_complete(store: Store) {
    let key = unique_name("scan");
    let entries: Vec<(String, String)> = (0..25)
        .map(|i| (format!("f{}", i), i.to_string()))
        .collect();
    store.hset_many(&key, &entries).await.expect("hset_many");

    let mut seen = HashSet::new();
    let mut cursor = SCAN_START.to_string();
    loop {
        let page = store.hscan(&key, &cursor, 4).await.expect("hscan");
        for (field, value) in page.entries {
            assert_eq!(&field[1..], value.as_str(), "scan paired {} with {}", field, value);
            assert!(seen.insert(field.clone()), "{} returned twice", field);
        }
        if page.cursor == SCAN_START {
            break;
        }
        cursor = page.cursor;
    }
    assert_eq!(seen.len(), 25);

    store.del(&key).await.expect("cleanup");
}

/// `put` then `get` returns the value, and `size` moves by exactly one.
pub async fn run_map_basics(store: Store) {
    let mut map = RemoteMap::private(store, &MapConfig::default());

    assert_eq!(map.put("k", "v").await.expect("put"), None);
    assert_eq!(map.get("k").await.expect("get").as_deref(), Some("v"));
    assert_eq!(map.size().await.expect("size"), 1);

    map.put("other", "x").await.expect("put");
    assert_eq!(map.size().await.expect("size"), 2);

    assert_eq!(map.remove("k").await.expect("remove").as_deref(), Some("v"));
    assert_eq!(map.size().await.expect("size"), 1);
    assert_eq!(map.remove("k").await.expect("remove"), None);
    assert_eq!(map.size().await.expect("size"), 1);

    map.release().await.expect("release");
}

/// Two handles on one shared name see each other's writes.
pub async fn run_shared_visibility(store: Store) {
    let name = unique_name("shared");
    let config = MapConfig::default();

    let mut a = RemoteMap::shared(store.clone(), name.clone(), &config)
        .await
        .expect("open a");
    a.put("one", "1").await.expect("put");
    a.put("two", "2").await.expect("put");

    let mut b = RemoteMap::shared(store, name, &config)
        .await
        .expect("open b");
    assert_eq!(b.size().await.expect("size"), 2);
    assert_eq!(b.get("one").await.expect("get").as_deref(), Some("1"));

    b.put("one", "100").await.expect("put");
    assert_eq!(a.get("one").await.expect("get").as_deref(), Some("100"));

    a.release().await.expect("release a");
    b.release().await.expect("release b");
}

/// Releasing `holders - 1` handles keeps the map; releasing the last deletes it.
pub async fn run_last_release_deletes(store: Store, holders: usize) {
    assert!(holders > 0);
    let name = unique_name("refcount");
    let config = MapConfig::default();

    let mut handles = Vec::with_capacity(holders);
    for _ in 0..holders {
        let handle = RemoteMap::shared(store.clone(), name.clone(), &config)
            .await
            .expect("open");
        handles.push(handle);
    }
    handles[0].put("k", "v").await.expect("put");

    let mut last = handles.pop().expect("at least one handle");
    for mut handle in handles {
        handle.release().await.expect("release");
        assert_eq!(last.size().await.expect("size"), 1, "map deleted early");
    }
    last.release().await.expect("release last");

    let mut fresh = RemoteMap::shared(store.clone(), name.clone(), &config)
        .await
        .expect("reopen");
    assert_eq!(fresh.size().await.expect("size"), 0);
    fresh.release().await.expect("release fresh");

    let registry = config.registry_key(&name);
    assert_eq!(store.hlen(&registry).await.expect("hlen"), 0);
}

/// Iterating `{a:1, b:2, c:3, d:4}` yields exactly those keys.
pub async fn run_iteration_is_exact(store: Store) {
    let config = MapConfig {
        scan_count: 1,
        ..MapConfig::default()
    };
    let mut map = RemoteMap::private(store, &config);
    map.put_all([("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")])
        .await
        .expect("put_all");

    let mut keys = map.key_set().iter().await.expect("iter");
    let mut seen = Vec::new();
    while let Some(key) = keys.next().await.expect("next") {
        seen.push(key);
    }
    seen.sort();
    assert_eq!(seen, ["a", "b", "c", "d"]);

    map.release().await.expect("release");
}

/// After `clear()` the map is empty and no view yields anything.
pub async fn run_clear_empties_views(store: Store) {
    let mut map = RemoteMap::private(store, &MapConfig::default());
    map.put_all([("a", "1"), ("b", "2")]).await.expect("put_all");

    map.clear().await.expect("clear");
    assert_eq!(map.size().await.expect("size"), 0);
    assert_eq!(
        map.key_set()
            .iter()
            .await
            .expect("iter")
            .next()
            .await
            .expect("next"),
        None
    );
    assert_eq!(
        map.values()
            .iter()
            .await
            .expect("iter")
            .next()
            .await
            .expect("next"),
        None
    );
    assert!(
        map.entry_set()
            .iter()
            .await
            .expect("iter")
            .next()
            .await
            .expect("next")
            .is_none()
    );

    map.release().await.expect("release");
}

/// Run every case against stores produced by `make_store`.
pub async fn run_all<F>(make_store: F)
where
    F: Fn() -> Store,
{
    run_hash_primitives(make_store()).await;
    run_bulk_set(make_store()).await;
    run_scan_is_complete(make_store()).await;
    run_map_basics(make_store()).await;
    run_shared_visibility(make_store()).await;
    run_last_release_deletes(make_store(), 3).await;
    run_iteration_is_exact(make_store()).await;
    run_clear_empties_views(make_store()).await;
    tracing::debug!("store conformance suite passed");
}
