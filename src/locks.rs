use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-entity async mutexes keyed by id.
///
/// Release and settlement paths serialize on the owning entity so concurrent
/// requests against the same manufacturing order or debt observe each other's
/// writes. Locks for different ids never contend.
#[derive(Clone)]
pub struct EntityLocks(Arc<DashMap<Uuid, Arc<Mutex<()>>>>);

impl Default for EntityLocks {
    fn default() -> Self {
        Self(Arc::new(DashMap::new()))
    }
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `id`, waiting if another task holds it.
    ///
    /// The guard is owned, so it can be held across await points for the
    /// duration of a multi-step transition.
    pub async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        // Clone the cell out before awaiting so no map shard lock is held
        // across the await.
        let cell = self
            .0
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        cell.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
