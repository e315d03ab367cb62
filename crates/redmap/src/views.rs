//! Live views of a map's keys, values and entries.
//!
//! Views borrow the map and forward every call to it; they never hold a local
//! copy. `clear()` on any view clears the whole map.
//!
//! `retain_all` rebuilds the map: it deletes the remote hash and bulk-inserts
//! the surviving entries. Other handles reading in between see an empty map.

use std::collections::HashSet;

use redmap_core::MapError;

use crate::cursor::Cursor;
use crate::{RemoteMap, StringMap};

fn collect_set<I, Q>(items: I) -> HashSet<String>
where
    I: IntoIterator<Item = Q>,
    Q: AsRef<str>,
{
    items.into_iter().map(|q| q.as_ref().to_string()).collect()
}

/// Scan every entry, keep those accepted by `keep`, and rebuild the map if
/// anything was dropped. Returns whether the map changed.
async fn retain_entries(
    map: &RemoteMap,
    keep: impl Fn(&str, &str) -> bool,
) -> Result<bool, MapError> {
    let mut cursor = map.cursor().await?;
    let mut survivors = Vec::new();
    let mut dropped = 0usize;
    while let Some((field, value)) = cursor.next().await? {
        if keep(&field, &value) {
            survivors.push((field, value));
        } else {
            dropped += 1;
        }
    }

    if dropped == 0 {
        return Ok(false);
    }
    map.rebuild(survivors).await?;
    Ok(true)
}

/// The map's keys.
#[derive(Debug, Clone, Copy)]
pub struct KeySet<'a> {
    map: &'a RemoteMap,
}

impl<'a> KeySet<'a> {
    pub(crate) fn new(map: &'a RemoteMap) -> Self {
        Self { map }
    }

    pub async fn size(&self) -> Result<usize, MapError> {
        self.map.size().await
    }

    pub async fn is_empty(&self) -> Result<bool, MapError> {
        self.map.is_empty().await
    }

    pub async fn contains(&self, key: &str) -> Result<bool, MapError> {
        self.map.contains_key(key).await
    }

    pub async fn contains_all<I, Q>(&self, keys: I) -> Result<bool, MapError>
    where
        I: IntoIterator<Item = Q>,
        Q: AsRef<str>,
    {
        for key in keys {
            if !self.map.contains_key(key.as_ref()).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Remove `key` from the map. Returns whether it was present.
    pub async fn remove(&self, key: &str) -> Result<bool, MapError> {
        Ok(self.map.remove(key).await?.is_some())
    }

    /// Remove every listed key. Returns whether anything was removed.
    pub async fn remove_all<I, Q>(&self, keys: I) -> Result<bool, MapError>
    where
        I: IntoIterator<Item = Q>,
        Q: AsRef<str>,
    {
        let mut changed = false;
        for key in keys {
            changed |= self.remove(key.as_ref()).await?;
        }
        Ok(changed)
    }

    /// Keep only the listed keys, rebuilding the map.
    pub async fn retain_all<I, Q>(&self, keys: I) -> Result<bool, MapError>
    where
        I: IntoIterator<Item = Q>,
        Q: AsRef<str>,
    {
        let keep = collect_set(keys);
        retain_entries(self.map, |field, _| keep.contains(field)).await
    }

    pub async fn clear(&self) -> Result<(), MapError> {
        self.map.clear().await
    }

    pub async fn iter(&self) -> Result<Keys<'a>, MapError> {
        Ok(Keys {
            cursor: self.map.cursor().await?,
        })
    }
}

/// The map's values. A value held by several keys appears several times.
#[derive(Debug, Clone, Copy)]
pub struct Values<'a> {
    map: &'a RemoteMap,
}

impl<'a> Values<'a> {
    pub(crate) fn new(map: &'a RemoteMap) -> Self {
        Self { map }
    }

    pub async fn size(&self) -> Result<usize, MapError> {
        self.map.size().await
    }

    pub async fn is_empty(&self) -> Result<bool, MapError> {
        self.map.is_empty().await
    }

    /// Whether any key holds `value`. Scans the whole map.
    pub async fn contains(&self, value: &str) -> Result<bool, MapError> {
        self.map.contains_value(value).await
    }

    pub async fn contains_all<I, Q>(&self, values: I) -> Result<bool, MapError>
    where
        I: IntoIterator<Item = Q>,
        Q: AsRef<str>,
    {
        let mut wanted = collect_set(values);
        if wanted.is_empty() {
            return Ok(true);
        }
        let mut cursor = self.map.cursor().await?;
        while let Some((_, value)) = cursor.next().await? {
            wanted.remove(&value);
            if wanted.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Remove the first entry found holding `value`. Returns whether one was
    /// removed.
    pub async fn remove(&self, value: &str) -> Result<bool, MapError> {
        let mut cursor = self.map.cursor().await?;
        while let Some((field, v)) = cursor.next().await? {
            if v == value {
                return self.map.delete_field(&field).await;
            }
        }
        Ok(false)
    }

    /// Remove every entry holding one of `values`.
    pub async fn remove_all<I, Q>(&self, values: I) -> Result<bool, MapError>
    where
        I: IntoIterator<Item = Q>,
        Q: AsRef<str>,
    {
        let unwanted = collect_set(values);
        let mut cursor = self.map.cursor().await?;
        let mut changed = false;
        while let Some((_, value)) = cursor.next().await? {
            if unwanted.contains(&value) {
                cursor.remove().await?;
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Keep only entries holding one of `values`, rebuilding the map.
    pub async fn retain_all<I, Q>(&self, values: I) -> Result<bool, MapError>
    where
        I: IntoIterator<Item = Q>,
        Q: AsRef<str>,
    {
        let keep = collect_set(values);
        retain_entries(self.map, |_, value| keep.contains(value)).await
    }

    pub async fn clear(&self) -> Result<(), MapError> {
        self.map.clear().await
    }

    pub async fn iter(&self) -> Result<ValuesIter<'a>, MapError> {
        Ok(ValuesIter {
            cursor: self.map.cursor().await?,
        })
    }
}

/// The map's entries.
#[derive(Debug, Clone, Copy)]
pub struct EntrySet<'a> {
    map: &'a RemoteMap,
}

impl<'a> EntrySet<'a> {
    pub(crate) fn new(map: &'a RemoteMap) -> Self {
        Self { map }
    }

    pub async fn size(&self) -> Result<usize, MapError> {
        self.map.size().await
    }

    pub async fn is_empty(&self) -> Result<bool, MapError> {
        self.map.is_empty().await
    }

    /// Whether `key` currently maps to `value`.
    pub async fn contains(&self, key: &str, value: &str) -> Result<bool, MapError> {
        Ok(self.map.get(key).await?.as_deref() == Some(value))
    }

    /// Remove `key` if it currently maps to `value`.
    ///
    /// The check and the delete are separate commands.
    pub async fn remove(&self, key: &str, value: &str) -> Result<bool, MapError> {
        if !self.contains(key, value).await? {
            return Ok(false);
        }
        self.map.delete_field(key).await
    }

    /// Remove every listed pair that is currently present.
    pub async fn remove_all<I, K, V>(&self, pairs: I) -> Result<bool, MapError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut changed = false;
        for (key, value) in pairs {
            changed |= self.remove(key.as_ref(), value.as_ref()).await?;
        }
        Ok(changed)
    }

    /// Keep only the listed pairs, rebuilding the map.
    pub async fn retain_all<I, K, V>(&self, pairs: I) -> Result<bool, MapError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let keep: HashSet<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        retain_entries(self.map, |field, value| {
            keep.contains(&(field.to_string(), value.to_string()))
        })
        .await
    }

    pub async fn clear(&self) -> Result<(), MapError> {
        self.map.clear().await
    }

    /// Get the live entry for `key`, whether or not it exists yet.
    pub fn entry(&self, key: impl Into<String>) -> Entry<'a> {
        Entry {
            map: self.map,
            key: key.into(),
        }
    }

    pub async fn iter(&self) -> Result<Entries<'a>, MapError> {
        Ok(Entries {
            cursor: self.map.cursor().await?,
        })
    }
}

/// A live entry: a key bound to the map.
///
/// The value is not captured; [`Entry::value`] and [`Entry::set_value`] read and
/// write whatever the map holds for the key at the time of the call.
#[derive(Debug, Clone)]
pub struct Entry<'a> {
    map: &'a RemoteMap,
    key: String,
}

impl Entry<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current value, or `None` if the key has been removed.
    pub async fn value(&self) -> Result<Option<String>, MapError> {
        self.map.get(&self.key).await
    }

    /// Set the value, returning the previous one.
    pub async fn set_value(&self, value: &str) -> Result<Option<String>, MapError> {
        self.map.put(&self.key, value).await
    }
}

/// Cursor over a map's keys.
pub struct Keys<'a> {
    cursor: Cursor<'a>,
}

impl Keys<'_> {
    pub fn has_next(&self) -> bool {
        self.cursor.has_next()
    }

    #[allow(clippy::should_implement_trait)]
    pub async fn next(&mut self) -> Result<Option<String>, MapError> {
        Ok(self.cursor.next().await?.map(|(field, _)| field))
    }

    /// Remove the key returned by the last `next()`.
    pub async fn remove(&mut self) -> Result<(), MapError> {
        self.cursor.remove().await
    }
}

/// Cursor over a map's values.
pub struct ValuesIter<'a> {
    cursor: Cursor<'a>,
}

impl ValuesIter<'_> {
    pub fn has_next(&self) -> bool {
        self.cursor.has_next()
    }

    #[allow(clippy::should_implement_trait)]
    pub async fn next(&mut self) -> Result<Option<String>, MapError> {
        Ok(self.cursor.next().await?.map(|(_, value)| value))
    }

    /// Remove the entry whose value was returned by the last `next()`.
    pub async fn remove(&mut self) -> Result<(), MapError> {
        self.cursor.remove().await
    }
}

/// Cursor over a map's entries.
pub struct Entries<'a> {
    cursor: Cursor<'a>,
}

impl<'a> Entries<'a> {
    pub fn has_next(&self) -> bool {
        self.cursor.has_next()
    }

    /// Next live entry. The value seen by the scan is not kept; read it with
    /// [`Entry::value`].
    #[allow(clippy::should_implement_trait)]
    pub async fn next(&mut self) -> Result<Option<Entry<'a>>, MapError> {
        let map = self.cursor.map();
        Ok(self
            .cursor
            .next()
            .await?
            .map(|(field, _)| Entry { map, key: field }))
    }

    /// Remove the entry returned by the last `next()`.
    pub async fn remove(&mut self) -> Result<(), MapError> {
        self.cursor.remove().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redmap_core::MapConfig;
    use redmap_core::mem::MemStore;

    async fn abcd() -> RemoteMap {
        let map = RemoteMap::private(MemStore::new(), &MapConfig::default());
        map.put_all([("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")])
            .await
            .unwrap();
        map
    }

    #[tokio::test]
    async fn key_set_enumerates_each_key_once() {
        let map = abcd().await;
        let mut keys = map.key_set().iter().await.unwrap();

        let mut seen = Vec::new();
        while let Some(key) = keys.next().await.unwrap() {
            seen.push(key);
        }
        seen.sort();
        assert_eq!(seen, ["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn views_delegate_size_contains_and_remove() {
        let map = abcd().await;
        let keys = map.key_set();
        let values = map.values();
        let entries = map.entry_set();

        assert_eq!(keys.size().await.unwrap(), 4);
        assert!(keys.contains("a").await.unwrap());
        assert!(values.contains("2").await.unwrap());
        assert!(entries.contains("c", "3").await.unwrap());
        assert!(!entries.contains("c", "4").await.unwrap());

        assert!(keys.remove("a").await.unwrap());
        assert!(!keys.remove("a").await.unwrap());
        assert!(values.remove("2").await.unwrap());
        assert!(!entries.remove("c", "nope").await.unwrap());
        assert!(entries.remove("c", "3").await.unwrap());

        assert_eq!(map.size().await.unwrap(), 1);
        assert_eq!(values.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn clear_on_a_view_clears_the_map() {
        let map = abcd().await;
        map.values().clear().await.unwrap();

        assert_eq!(map.size().await.unwrap(), 0);
        assert_eq!(map.key_set().iter().await.unwrap().next().await.unwrap(), None);
        assert_eq!(map.values().iter().await.unwrap().next().await.unwrap(), None);
        assert!(map.entry_set().iter().await.unwrap().next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn entries_read_and_write_live_values() {
        let map = abcd().await;
        let mut entries = map.entry_set().iter().await.unwrap();
        let entry = entries.next().await.unwrap().expect("map has entries");
        let key = entry.key().to_string();

        map.put(&key, "changed").await.unwrap();
        assert_eq!(entry.value().await.unwrap().as_deref(), Some("changed"));

        let previous = entry.set_value("set through entry").await.unwrap();
        assert_eq!(previous.as_deref(), Some("changed"));
        assert_eq!(
            map.get(&key).await.unwrap().as_deref(),
            Some("set through entry")
        );

        map.remove(&key).await.unwrap();
        assert_eq!(entry.value().await.unwrap(), None);
    }

    #[tokio::test]
    async fn retain_all_rebuilds_with_survivors() {
        let map = abcd().await;

        assert!(map.key_set().retain_all(["a", "c", "zzz"]).await.unwrap());
        let mut kept: Vec<_> = map.snapshot().await.unwrap().into_iter().collect();
        kept.sort();
        assert_eq!(
            kept,
            [
                ("a".to_string(), "1".to_string()),
                ("c".to_string(), "3".to_string())
            ]
        );

        assert!(!map.key_set().retain_all(["a", "c"]).await.unwrap());
    }

    #[tokio::test]
    async fn retain_all_on_values_and_entries() {
        let map = abcd().await;
        assert!(map.values().retain_all(["1", "2", "3"]).await.unwrap());
        assert_eq!(map.size().await.unwrap(), 3);

        assert!(map.entry_set().retain_all([("a", "1"), ("b", "wrong")]).await.unwrap());
        assert_eq!(map.snapshot().await.unwrap().len(), 1);

        assert!(map.values().retain_all(Vec::<String>::new()).await.unwrap());
        assert!(map.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn remove_all_and_contains_all() {
        let map = abcd().await;
        map.put("e", "1").await.unwrap();

        assert!(map.key_set().contains_all(["a", "b"]).await.unwrap());
        assert!(!map.key_set().contains_all(["a", "x"]).await.unwrap());
        assert!(map.values().contains_all(["1", "4"]).await.unwrap());

        assert!(map.values().remove_all(["1"]).await.unwrap());
        assert_eq!(map.size().await.unwrap(), 3);

        assert!(map.key_set().remove_all(["b", "x"]).await.unwrap());
        assert!(!map.key_set().remove_all(["x"]).await.unwrap());
        assert!(map.entry_set().remove_all([("c", "3")]).await.unwrap());
        assert_eq!(map.snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn key_iterator_remove() {
        let map = abcd().await;
        let mut keys = map.key_set().iter().await.unwrap();

        assert_eq!(keys.remove().await, Err(MapError::InvalidIteratorState));
        while let Some(key) = keys.next().await.unwrap() {
            if key == "b" || key == "d" {
                keys.remove().await.unwrap();
            }
        }

        assert!(!keys.has_next());
        assert_eq!(map.size().await.unwrap(), 2);
        assert!(!map.contains_key("b").await.unwrap());
    }
}
