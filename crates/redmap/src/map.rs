//! The map facade.
//!
//! Every operation is one or more round-trips to the store and reads live
//! remote state; nothing is cached locally and nothing is locked. Operations
//! made of several round-trips are not atomic: [`StringMap::put`] and
//! [`StringMap::remove`] read the old value and then write, so a concurrent
//! writer to the same field can slip in between and its value is not the one
//! reported back.

use std::collections::HashMap;

use redmap_core::{MapConfig, MapError, ScanPage, Store};
use uuid::Uuid;

use crate::cursor::Cursor;
use crate::lifecycle::{Lease, Ownership};
use crate::views::{EntrySet, KeySet, Values};

/// A string-to-string map.
///
/// [`RemoteMap`] is the implementation; the trait exists so code can be
/// written against the map contract alone.
#[allow(async_fn_in_trait)]
pub trait StringMap {
    /// Number of entries.
    async fn size(&self) -> Result<usize, MapError>;

    async fn is_empty(&self) -> Result<bool, MapError> {
        Ok(self.size().await? == 0)
    }

    async fn contains_key(&self, key: &str) -> Result<bool, MapError>;

    /// Whether any entry holds `value`. Scans the whole map.
    async fn contains_value(&self, value: &str) -> Result<bool, MapError>;

    async fn get(&self, key: &str) -> Result<Option<String>, MapError>;

    /// Set `key` to `value`, returning the previous value.
    async fn put(&self, key: &str, value: &str) -> Result<Option<String>, MapError>;

    /// Remove `key`, returning the value it held.
    async fn remove(&self, key: &str) -> Result<Option<String>, MapError>;

    /// Insert every pair with a single bulk write.
    async fn put_all<I, K, V>(&self, entries: I) -> Result<(), MapError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>;

    /// Remove every entry.
    async fn clear(&self) -> Result<(), MapError>;

    fn key_set(&self) -> KeySet<'_>;

    fn values(&self) -> Values<'_>;

    fn entry_set(&self) -> EntrySet<'_>;
}

/// Handle to a map stored in a remote hash.
///
/// A handle is either private (bound to a randomly named hash that only it
/// uses) or shared (bound to a named hash that any number of handles, in any
/// number of processes, can open at once). Release a handle with
/// [`RemoteMap::release`] when done; a handle dropped unreleased is reclaimed
/// in the background on a best-effort basis.
///
/// ```rust
/// # async fn demo() -> Result<(), redmap::MapError> {
/// use redmap::{MapConfig, RemoteMap, Store, StringMap};
///
/// let store = Store::in_memory();
/// let config = MapConfig::default();
///
/// let mut a = RemoteMap::shared(store.clone(), "scores", &config).await?;
/// let mut b = RemoteMap::shared(store, "scores", &config).await?;
///
/// a.put("alice", "10").await?;
/// assert_eq!(b.get("alice").await?.as_deref(), Some("10"));
///
/// a.release().await?;
/// b.release().await?;
/// # Ok(())
/// # }
/// ```
pub struct RemoteMap {
    store: Store,
    key: String,
    scan_count: usize,
    lease: Lease,
}

impl RemoteMap {
    /// A private map under a fresh random key.
    pub fn private(store: impl Into<Store>, config: &MapConfig) -> Self {
        let store = store.into();
        let id = Uuid::new_v4();
        let key = id.to_string();

        tracing::debug!(map = %key, "opened private map");
        Self {
            lease: Lease::private(store.clone(), id, key.clone()),
            store,
            key,
            scan_count: config.scan_count,
        }
    }

    /// A handle on the shared map `name`, registered before it is returned.
    ///
    /// An empty name is rejected with [`MapError::Config`].
    pub async fn shared(
        store: impl Into<Store>,
        name: impl Into<String>,
        config: &MapConfig,
    ) -> Result<Self, MapError> {
        let store = store.into();
        let key = name.into();
        if key.is_empty() {
            return Err(MapError::Config("shared map name cannot be empty".into()));
        }
        let ownership = Ownership::Shared {
            registry_key: config.registry_key(&key),
        };
        let lease = Lease::acquire(store.clone(), Uuid::new_v4(), key.clone(), ownership).await?;

        Ok(Self {
            store,
            key,
            scan_count: config.scan_count,
            lease,
        })
    }

    /// Shared if `config.shared_name` is set, private otherwise.
    pub async fn open(store: impl Into<Store>, config: &MapConfig) -> Result<Self, MapError> {
        match &config.shared_name {
            Some(name) => Self::shared(store, name.clone(), config).await,
            None => Ok(Self::private(store, config)),
        }
    }

    /// Connect to the Redis server in `config` and open a handle on it.
    #[cfg(feature = "redis")]
    pub async fn connect(config: &MapConfig) -> Result<Self, MapError> {
        let store = redmap_core::redis::RedisStore::connect(config).await?;
        Self::open(store, config).await
    }

    /// Open a handle, run `f` with it, then release it.
    ///
    /// The handle is released even when `f` fails; the error from `f` takes
    /// precedence over a release error.
    pub async fn scoped<F, T>(
        store: impl Into<Store>,
        config: &MapConfig,
        f: F,
    ) -> Result<T, MapError>
    where
        F: AsyncFnOnce(&RemoteMap) -> Result<T, MapError>,
    {
        let mut map = Self::open(store, config).await?;
        let result = f(&map).await;
        let released = map.release().await;
        let value = result?;
        released?;
        Ok(value)
    }

    /// Unique id of this handle.
    pub fn id(&self) -> Uuid {
        self.lease.id()
    }

    /// Key of the remote hash holding the entries.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_shared(&self) -> bool {
        self.lease.ownership().is_shared()
    }

    /// Key of the companion registry, for shared maps.
    pub fn registry_key(&self) -> Option<&str> {
        self.lease.ownership().registry_key()
    }

    /// Number of handles currently registered on a shared map; `None` for a
    /// private map.
    pub async fn holders(&self) -> Result<Option<usize>, MapError> {
        self.live()?;
        self.lease.holders().await
    }

    pub fn is_released(&self) -> bool {
        self.lease.is_released()
    }

    /// Give up this handle's claim on the map.
    ///
    /// A private map is deleted. A shared map is deleted together with its
    /// registry when this was the last registered handle. Releasing again is
    /// a no-op; every other operation fails with [`MapError::Released`]
    /// afterwards.
    pub async fn release(&mut self) -> Result<(), MapError> {
        self.lease.release().await
    }

    /// Start a cursor over the entries.
    pub async fn cursor(&self) -> Result<Cursor<'_>, MapError> {
        self.live()?;
        Cursor::open(self).await
    }

    /// Copy the current entries into a local map.
    pub async fn snapshot(&self) -> Result<HashMap<String, String>, MapError> {
        let mut cursor = self.cursor().await?;
        let mut entries = HashMap::new();
        while let Some((field, value)) = cursor.next().await? {
            entries.insert(field, value);
        }
        Ok(entries)
    }

    fn live(&self) -> Result<&Store, MapError> {
        if self.lease.is_released() {
            return Err(MapError::Released);
        }
        Ok(&self.store)
    }

    pub(crate) async fn scan_page(&self, cursor: &str) -> Result<ScanPage, MapError> {
        self.live()?.hscan(&self.key, cursor, self.scan_count).await
    }

    pub(crate) async fn delete_field(&self, field: &str) -> Result<bool, MapError> {
        self.live()?.hdel(&self.key, field).await
    }

    /// Replace the whole map with `entries`: delete the key, then bulk insert.
    ///
    /// Between the two commands other handles observe an empty map.
    pub(crate) async fn rebuild(&self, entries: Vec<(String, String)>) -> Result<(), MapError> {
        tracing::debug!(map = %self.key, survivors = entries.len(), "rebuilding map");
        let store = self.live()?;
        store.del(&self.key).await?;
        store.hset_many(&self.key, &entries).await
    }
}

impl StringMap for RemoteMap {
    async fn size(&self) -> Result<usize, MapError> {
        self.live()?.hlen(&self.key).await
    }

    async fn contains_key(&self, key: &str) -> Result<bool, MapError> {
        self.live()?.hexists(&self.key, key).await
    }

    async fn contains_value(&self, value: &str) -> Result<bool, MapError> {
        let mut cursor = self.cursor().await?;
        while let Some((_, v)) = cursor.next().await? {
            if v == value {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, MapError> {
        self.live()?.hget(&self.key, key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<Option<String>, MapError> {
        let store = self.live()?;
        let previous = store.hget(&self.key, key).await?;
        store.hset(&self.key, key, value).await?;
        Ok(previous)
    }

    async fn remove(&self, key: &str) -> Result<Option<String>, MapError> {
        let store = self.live()?;
        let previous = store.hget(&self.key, key).await?;
        if previous.is_some() {
            store.hdel(&self.key, key).await?;
        }
        Ok(previous)
    }

    async fn put_all<I, K, V>(&self, entries: I) -> Result<(), MapError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries: Vec<(String, String)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.live()?.hset_many(&self.key, &entries).await
    }

    async fn clear(&self) -> Result<(), MapError> {
        self.live()?.del(&self.key).await?;
        Ok(())
    }

    fn key_set(&self) -> KeySet<'_> {
        KeySet::new(self)
    }

    fn values(&self) -> Values<'_> {
        Values::new(self)
    }

    fn entry_set(&self) -> EntrySet<'_> {
        EntrySet::new(self)
    }
}

impl std::fmt::Debug for RemoteMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteMap")
            .field("key", &self.key)
            .field("id", &self.lease.id())
            .field("shared", &self.is_shared())
            .field("released", &self.is_released())
            .finish()
    }
}
