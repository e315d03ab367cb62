//! Shared ownership and teardown of remote maps.
//!
//! A shared map is reference counted through a companion registry hash
//! (`clients-<map key>` by default) whose fields are the ids of the handles
//! currently holding the map. Teardown is a function of two remote facts: whether
//! the map is tracked by a registry at all, and how many holders remain once
//! the releasing handle has deregistered:
//!
//! | registry after deregistering | action                          |
//! |------------------------------|---------------------------------|
//! | untracked (private map)      | delete the map                  |
//! | empty                        | delete the registry and the map |
//! | held by `n > 0` handles      | keep both                       |
//!
//! Teardown runs on exactly two events: an explicit [`RemoteMap::release`] and
//! reclamation of a handle dropped without releasing. Reclamation is spawned on
//! the ambient tokio runtime and is best-effort: it runs at some later point,
//! and never if the handle is dropped outside a runtime or the runtime shuts
//! down first.
//!
//! Deregistering and counting the remaining holders are separate commands; a
//! handle registering in between can find its map deleted under it.
//!
//! [`RemoteMap::release`]: crate::RemoteMap::release

use redmap_core::{MapError, Store};
use uuid::Uuid;

/// Presence marker stored as the value of each registry field.
pub const PRESENCE_MARKER: &str = "1";

/// How a handle holds its map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// Randomly named map bound to exactly one handle.
    Private,
    /// Named map reference counted through the registry at `registry_key`.
    Shared { registry_key: String },
}

impl Ownership {
    pub fn is_shared(&self) -> bool {
        matches!(self, Ownership::Shared { .. })
    }

    pub fn registry_key(&self) -> Option<&str> {
        match self {
            Ownership::Private => None,
            Ownership::Shared { registry_key } => Some(registry_key),
        }
    }
}

/// State of a map's registry after a handle deregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// The map has no registry (private map).
    Untracked,
    /// The registry has no fields left.
    Empty,
    /// The registry still lists this many handles.
    Held(usize),
}

impl RegistryState {
    pub fn from_holders(holders: usize) -> Self {
        if holders == 0 {
            RegistryState::Empty
        } else {
            RegistryState::Held(holders)
        }
    }
}

/// Remote deletions to perform after a handle deregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Other handles still hold the map.
    Keep,
    /// Delete the map key.
    DeleteMap,
    /// Delete the registry key, then the map key.
    DeleteMapAndRegistry,
}

/// Event that triggered a teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Explicit `release()`.
    Release,
    /// The handle was dropped without being released.
    Reclaim,
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleEvent::Release => write!(f, "release"),
            LifecycleEvent::Reclaim => write!(f, "reclaim"),
        }
    }
}

/// The transition function: what to delete given the registry state.
pub fn plan_teardown(registry: RegistryState) -> Teardown {
    match registry {
        RegistryState::Untracked => Teardown::DeleteMap,
        RegistryState::Empty => Teardown::DeleteMapAndRegistry,
        RegistryState::Held(_) => Teardown::Keep,
    }
}

/// A handle's claim on its remote map.
///
/// Dropping an unreleased lease spawns reclamation on the current tokio runtime.
pub(crate) struct Lease {
    id: Uuid,
    store: Store,
    map_key: String,
    ownership: Ownership,
    released: bool,
}

impl Lease {
    /// Take a claim on `map_key`, registering in the registry first if shared.
    pub(crate) async fn acquire(
        store: Store,
        id: Uuid,
        map_key: String,
        ownership: Ownership,
    ) -> Result<Self, MapError> {
        if let Ownership::Shared { registry_key } = &ownership {
            store
                .hset(registry_key, &id.to_string(), PRESENCE_MARKER)
                .await?;
            tracing::debug!(map = %map_key, handle = %id, "registered shared handle");
        }

        Ok(Self {
            id,
            store,
            map_key,
            ownership,
            released: false,
        })
    }

    /// Claim on a private map. Nothing is registered remotely.
    pub(crate) fn private(store: Store, id: Uuid, map_key: String) -> Self {
        Self {
            id,
            store,
            map_key,
            ownership: Ownership::Private,
            released: false,
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released
    }

    /// Number of handles listed in the registry, or `None` for a private map.
    pub(crate) async fn holders(&self) -> Result<Option<usize>, MapError> {
        match self.ownership.registry_key() {
            None => Ok(None),
            Some(registry_key) => Ok(Some(self.store.hlen(registry_key).await?)),
        }
    }

    /// Deregister and tear down. Calling it again after success does nothing.
    ///
    /// On failure the lease stays unreleased, so dropping it retries the
    /// teardown as a reclamation.
    pub(crate) async fn release(&mut self) -> Result<(), MapError> {
        if self.released {
            return Ok(());
        }
        teardown(
            &self.store,
            &self.map_key,
            &self.ownership,
            self.id,
            LifecycleEvent::Release,
        )
        .await?;
        self.released = true;
        Ok(())
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let store = self.store.clone();
        let map_key = std::mem::take(&mut self.map_key);
        let ownership = self.ownership.clone();
        let id = self.id;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) =
                        teardown(&store, &map_key, &ownership, id, LifecycleEvent::Reclaim).await
                    {
                        tracing::warn!(
                            map = %map_key,
                            handle = %id,
                            error = %e,
                            "reclamation of dropped map handle failed"
                        );
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    map = %map_key,
                    handle = %id,
                    "map handle dropped outside a tokio runtime without release; remote state left behind"
                );
            }
        }
    }
}

/// Deregister `id` and perform the planned deletions.
async fn teardown(
    store: &Store,
    map_key: &str,
    ownership: &Ownership,
    id: Uuid,
    event: LifecycleEvent,
) -> Result<Teardown, MapError> {
    let registry = match ownership {
        Ownership::Private => RegistryState::Untracked,
        Ownership::Shared { registry_key } => {
            store.hdel(registry_key, &id.to_string()).await?;
            RegistryState::from_holders(store.hlen(registry_key).await?)
        }
    };

    let plan = plan_teardown(registry);
    match plan {
        Teardown::Keep => {}
        Teardown::DeleteMap => {
            store.del(map_key).await?;
        }
        Teardown::DeleteMapAndRegistry => {
            if let Some(registry_key) = ownership.registry_key() {
                store.del(registry_key).await?;
            }
            store.del(map_key).await?;
        }
    }

    tracing::debug!(
        map = %map_key,
        handle = %id,
        %event,
        ?registry,
        ?plan,
        "map handle torn down"
    );
    Ok(plan)
}
