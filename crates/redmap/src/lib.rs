#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod cursor;
pub mod lifecycle;
mod map;
mod views;

pub use cursor::Cursor;
pub use map::{RemoteMap, StringMap};
pub use views::{Entries, Entry, EntrySet, KeySet, Keys, Values, ValuesIter};

// Re-export core types
pub use redmap_core::{
    // Configuration
    DEFAULT_REGISTRY_PREFIX,
    DEFAULT_SCAN_COUNT,
    MapConfig,
    // Errors
    MapError,
    // Stores
    SCAN_START,
    ScanPage,
    Store,
};

/// Store backends.
///
/// Each backend is behind a feature flag:
///
/// ```toml
/// [dependencies]
/// redmap = { version = "0.1", features = ["redis"] }
/// ```
pub mod store {
    #[cfg(feature = "mem")]
    pub use redmap_core::mem::MemStore;

    #[cfg(feature = "redis")]
    pub use redmap_core::redis::RedisStore;
}

#[cfg(feature = "mem")]
pub use store::MemStore;

#[cfg(feature = "redis")]
pub use store::RedisStore;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use redmap::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{MapConfig, MapError, RemoteMap, Store, StringMap};
}
