use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::{MapError, SCAN_START, ScanPage};

use super::StoreBackend;

/// Marks a non-initial cursor; the rest of the token is the next field to return.
const CURSOR_PREFIX: &str = ">";

/// In-process keyspace of hashes with Redis hash semantics.
///
/// Clones share the keyspace, so several handles built from clones of one
/// `MemStore` behave like several clients of one server. Fields are scanned
/// in lexicographic order and the cursor names the next field, so fields that
/// stay present for a whole scan are returned exactly once even when other
/// fields are deleted in between.
#[derive(Clone, Debug, Default)]
pub struct MemStore {
    inner: Arc<MemInner>,
}

#[derive(Debug, Default)]
struct MemInner {
    keyspace: Mutex<HashMap<String, BTreeMap<String, String>>>,
    offline: AtomicBool,
    commands: AtomicU64,
    /// Empty scan pages still to be served before real data.
    empty_pages: AtomicUsize,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent command fail with [`MapError::Communication`]
    /// until switched back.
    pub fn set_offline(&self, offline: bool) {
        tracing::debug!(offline, "mem store connectivity switched");
        self.inner.offline.store(offline, Ordering::Release);
    }

    /// Answer the next `pages` scans that still have fields ahead of them with
    /// an empty batch and a cursor that resumes at the same field, the way a
    /// Redis `HSCAN` may visit empty buckets.
    pub fn set_empty_pages(&self, pages: usize) {
        tracing::debug!(pages, "mem store will serve empty scan pages");
        self.inner.empty_pages.store(pages, Ordering::Release);
    }

    fn take_empty_page(&self) -> bool {
        self.inner
            .empty_pages
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn is_offline(&self) -> bool {
        self.inner.offline.load(Ordering::Acquire)
    }

    /// Number of commands served so far, failed ones included.
    pub fn commands(&self) -> u64 {
        self.inner.commands.load(Ordering::Relaxed)
    }

    /// Whether `key` currently exists.
    pub fn exists(&self, key: &str) -> bool {
        self.inner.keyspace.lock().contains_key(key)
    }

    /// All existing keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.keyspace.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn begin(&self) -> Result<(), MapError> {
        self.inner.commands.fetch_add(1, Ordering::Relaxed);
        if self.is_offline() {
            return Err(MapError::communication("connection refused (store offline)"));
        }
        Ok(())
    }

    fn read<R>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&BTreeMap<String, String>>) -> R,
    ) -> Result<R, MapError> {
        self.begin()?;
        let keyspace = self.inner.keyspace.lock();
        Ok(f(keyspace.get(key)))
    }

    fn write<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, BTreeMap<String, String>>) -> R,
    ) -> Result<R, MapError> {
        self.begin()?;
        let mut keyspace = self.inner.keyspace.lock();
        Ok(f(&mut keyspace))
    }
}

impl StoreBackend for MemStore {
    async fn hlen(&self, key: &str) -> Result<usize, MapError> {
        self.read(key, |hash| hash.map_or(0, BTreeMap::len))
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, MapError> {
        self.read(key, |hash| hash.is_some_and(|h| h.contains_key(field)))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, MapError> {
        self.read(key, |hash| hash.and_then(|h| h.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), MapError> {
        self.write(|keyspace| {
            keyspace
                .entry(key.to_string())
                .or_default()
                .insert(field.to_string(), value.to_string());
        })
    }

    async fn hset_many(&self, key: &str, entries: &[(String, String)]) -> Result<(), MapError> {
        self.write(|keyspace| {
            let hash = keyspace.entry(key.to_string()).or_default();
            for (field, value) in entries {
                hash.insert(field.clone(), value.clone());
            }
        })
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, MapError> {
        self.write(|keyspace| {
            let Some(hash) = keyspace.get_mut(key) else {
                return false;
            };
            let existed = hash.remove(field).is_some();
            // A hash with no fields does not exist.
            if hash.is_empty() {
                keyspace.remove(key);
            }
            existed
        })
    }

    async fn del(&self, key: &str) -> Result<bool, MapError> {
        self.write(|keyspace| keyspace.remove(key).is_some())
    }

    async fn hscan(&self, key: &str, cursor: &str, count: usize) -> Result<ScanPage, MapError> {
        let resume_at = if cursor == SCAN_START {
            None
        } else {
            let field = cursor
                .strip_prefix(CURSOR_PREFIX)
                .ok_or_else(|| MapError::communication(format!("ERR invalid cursor: {}", cursor)))?;
            Some(field.to_string())
        };

        self.read(key, |hash| {
            let Some(hash) = hash else {
                return ScanPage {
                    cursor: SCAN_START.to_string(),
                    entries: Vec::new(),
                };
            };

            let lower = match &resume_at {
                Some(field) => Bound::Included(field.as_str()),
                None => Bound::Unbounded,
            };
            let mut fields = hash.range::<str, _>((lower, Bound::Unbounded)).peekable();

            if let Some((next, _)) = fields.peek() {
                if self.take_empty_page() {
                    return ScanPage {
                        cursor: format!("{}{}", CURSOR_PREFIX, next),
                        entries: Vec::new(),
                    };
                }
            }

            let entries: Vec<(String, String)> = fields
                .by_ref()
                .take(count.max(1))
                .map(|(f, v)| (f.clone(), v.clone()))
                .collect();

            let cursor = match fields.next() {
                Some((next, _)) => format!("{}{}", CURSOR_PREFIX, next),
                None => SCAN_START.to_string(),
            };

            ScanPage { cursor, entries }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[tokio::test]
    async fn clones_share_the_keyspace() {
        let a = MemStore::new();
        let b = Store::from(a.clone());

        b.hset("h", "f", "v").await.unwrap();
        assert!(a.exists("h"));
        let value = Store::from(a).hget("h", "f").await.unwrap();
        assert_eq!(value.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn deleting_the_last_field_removes_the_key() {
        let mem = MemStore::new();
        let store = Store::from(mem.clone());

        store.hset("h", "only", "1").await.unwrap();
        assert!(store.hdel("h", "only").await.unwrap());
        assert!(!mem.exists("h"));
        assert!(!store.hdel("h", "only").await.unwrap());
    }

    #[tokio::test]
    async fn scan_pages_through_fields_in_order() {
        let store = Store::in_memory();
        for i in 0..5 {
            store.hset("h", &format!("f{}", i), &i.to_string()).await.unwrap();
        }

        let first = store.hscan("h", SCAN_START, 2).await.unwrap();
        assert_eq!(first.cursor, ">f2");
        assert_eq!(first.entries.len(), 2);

        let second = store.hscan("h", &first.cursor, 2).await.unwrap();
        assert_eq!(second.cursor, ">f4");

        let last = store.hscan("h", &second.cursor, 2).await.unwrap();
        assert!(last.is_final());
        assert_eq!(last.entries, vec![("f4".to_string(), "4".to_string())]);
    }

    #[tokio::test]
    async fn scan_survives_deletes_behind_the_cursor() {
        let store = Store::in_memory();
        for field in ["a", "b", "c", "d"] {
            store.hset("h", field, "x").await.unwrap();
        }

        let first = store.hscan("h", SCAN_START, 2).await.unwrap();
        store.hdel("h", "a").await.unwrap();
        store.hdel("h", "b").await.unwrap();

        let rest = store.hscan("h", &first.cursor, 2).await.unwrap();
        let fields: Vec<&str> = rest.entries.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, ["c", "d"]);
        assert!(rest.is_final());
    }

    #[tokio::test]
    async fn malformed_cursor_is_rejected() {
        let store = Store::in_memory();
        store.hset("h", "a", "1").await.unwrap();
        assert!(store.hscan("h", "17", 2).await.is_err());
    }

    #[tokio::test]
    async fn scan_of_absent_key_is_final_and_empty() {
        let store = Store::in_memory();
        let page = store.hscan("missing", SCAN_START, 10).await.unwrap();
        assert!(page.is_final());
        assert!(page.entries.is_empty());
    }

    #[tokio::test]
    async fn offline_store_fails_every_command() {
        init_tracing();
        let mem = MemStore::new();
        let store = Store::from(mem.clone());
        mem.set_offline(true);

        let err = store.hlen("h").await.unwrap_err();
        assert!(err.is_communication());
        assert!(store.hscan("h", SCAN_START, 1).await.is_err());

        mem.set_offline(false);
        assert_eq!(store.hlen("h").await.unwrap(), 0);
        assert_eq!(mem.commands(), 3);
    }

    #[tokio::test]
    async fn empty_pages_resume_where_they_stopped() {
        init_tracing();
        let mem = MemStore::new();
        let store = Store::from(mem.clone());
        for field in ["a", "b", "c"] {
            store.hset("h", field, "x").await.unwrap();
        }
        mem.set_empty_pages(2);

        let first = store.hscan("h", SCAN_START, 2).await.unwrap();
        assert!(first.entries.is_empty());
        assert!(!first.is_final());
        assert_eq!(first.cursor, ">a");

        let second = store.hscan("h", &first.cursor, 2).await.unwrap();
        assert!(second.entries.is_empty());
        assert_eq!(second.cursor, ">a");

        let third = store.hscan("h", &second.cursor, 2).await.unwrap();
        assert_eq!(third.entries.len(), 2);
        assert_eq!(third.cursor, ">c");
    }

    #[tokio::test]
    async fn empty_pages_are_not_served_past_the_end() {
        let mem = MemStore::new();
        mem.set_empty_pages(1);

        let page = Store::from(mem).hscan("missing", SCAN_START, 2).await.unwrap();
        assert!(page.is_final());
    }
}
