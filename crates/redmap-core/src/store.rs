//! Store enum and internal backend trait.
//!
//! The public API is the [`Store`] enum. Each backend lives in its own module
//! under `store/` and implements the internal [`StoreBackend`] trait; `Store`
//! forwards every call with a plain `match`.
//!
//! A store is a handle to a keyspace of hashes. Cloning it is cheap and every
//! clone talks to the same keyspace.

use crate::MapError;

/// Cursor token that starts a scan, and that a scan returns once it is complete.
pub const SCAN_START: &str = "0";

/// One batch returned by a cursor scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Token to pass to the next scan; [`SCAN_START`] once the scan is complete.
    pub cursor: String,
    /// Field/value pairs of this batch. May be empty even when `cursor` is not
    /// [`SCAN_START`].
    pub entries: Vec<(String, String)>,
}

impl ScanPage {
    /// Whether the store reported the end of the scan.
    pub fn is_final(&self) -> bool {
        self.cursor == SCAN_START
    }
}

pub(crate) trait StoreBackend: Send + Sync + Clone + 'static {
    async fn hlen(&self, key: &str) -> Result<usize, MapError>;
    async fn hexists(&self, key: &str, field: &str) -> Result<bool, MapError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, MapError>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), MapError>;
    async fn hset_many(&self, key: &str, entries: &[(String, String)]) -> Result<(), MapError>;
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, MapError>;
    async fn del(&self, key: &str) -> Result<bool, MapError>;
    async fn hscan(&self, key: &str, cursor: &str, count: usize) -> Result<ScanPage, MapError>;
}

/// Handle to a remote hash service.
#[derive(Clone, Debug)]
pub enum Store {
    #[cfg(feature = "mem")]
    Mem(mem::MemStore),
    #[cfg(feature = "redis")]
    Redis(redis::RedisStore),
}

macro_rules! forward {
    ($self:ident, $inner:ident => $call:expr) => {
        match $self {
            #[cfg(feature = "mem")]
            Store::Mem($inner) => $call.await,
            #[cfg(feature = "redis")]
            Store::Redis($inner) => $call.await,
        }
    };
}

impl Store {
    /// Number of fields in the hash at `key` (0 if the key is absent).
    pub async fn hlen(&self, key: &str) -> Result<usize, MapError> {
        forward!(self, inner => StoreBackend::hlen(inner, key))
    }

    /// Whether `field` exists in the hash at `key`.
    pub async fn hexists(&self, key: &str, field: &str) -> Result<bool, MapError> {
        forward!(self, inner => StoreBackend::hexists(inner, key, field))
    }

    /// Value of `field`, or `None` if the field or the key is absent.
    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, MapError> {
        forward!(self, inner => StoreBackend::hget(inner, key, field))
    }

    /// Set one field, creating the hash if needed.
    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), MapError> {
        forward!(self, inner => StoreBackend::hset(inner, key, field, value))
    }

    /// Set several fields with a single command. An empty slice is a no-op.
    pub async fn hset_many(&self, key: &str, entries: &[(String, String)]) -> Result<(), MapError> {
        if entries.is_empty() {
            return Ok(());
        }
        forward!(self, inner => StoreBackend::hset_many(inner, key, entries))
    }

    /// Delete one field. Returns whether the field existed.
    pub async fn hdel(&self, key: &str, field: &str) -> Result<bool, MapError> {
        forward!(self, inner => StoreBackend::hdel(inner, key, field))
    }

    /// Delete the whole key. Returns whether the key existed.
    pub async fn del(&self, key: &str) -> Result<bool, MapError> {
        forward!(self, inner => StoreBackend::del(inner, key))
    }

    /// Fetch one batch of a cursor scan over the hash at `key`.
    ///
    /// `count` is a hint; backends may return more or fewer entries.
    pub async fn hscan(&self, key: &str, cursor: &str, count: usize) -> Result<ScanPage, MapError> {
        forward!(self, inner => StoreBackend::hscan(inner, key, cursor, count))
    }

    /// A fresh, empty in-process store.
    #[cfg(feature = "mem")]
    pub fn in_memory() -> Self {
        Store::Mem(mem::MemStore::new())
    }
}

#[cfg(feature = "mem")]
impl From<mem::MemStore> for Store {
    fn from(store: mem::MemStore) -> Self {
        Store::Mem(store)
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisStore> for Store {
    fn from(store: redis::RedisStore) -> Self {
        Store::Redis(store)
    }
}

#[cfg(feature = "mem")]
pub mod mem;
#[cfg(feature = "redis")]
pub mod redis;
