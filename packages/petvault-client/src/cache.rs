//! Bounded in-memory store for resolved ownership snapshots.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use alloy_primitives::Address;
use petvault_types::OwnershipSnapshot;
use tracing::debug;

/// Per-address snapshot cache with least-recently-used eviction.
///
/// Snapshots are replaced whole on insert, never patched. Readers get clones,
/// so a snapshot handed out stays valid after the entry is evicted or
/// replaced. A poisoned lock is recovered rather than propagated: the cache
/// holds no invariants a panicked writer could have broken mid-update.
pub struct SnapshotCache {
    capacity: usize,
    inner: RwLock<Inner>,
}

struct Inner {
    entries: HashMap<Address, OwnershipSnapshot>,
    // Front is least recently used.
    recency: Vec<Address>,
}

impl SnapshotCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                recency: Vec::new(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Clone of the cached snapshot for `owner`, marking the entry as
    /// recently used.
    pub fn get(&self, owner: Address) -> Option<OwnershipSnapshot> {
        let mut guard = self.write();
        let inner = &mut *guard;
        let snapshot = inner.entries.get(&owner).cloned()?;
        touch(&mut inner.recency, owner);
        Some(snapshot)
    }

    /// Insert or replace the snapshot for `owner`, evicting the least
    /// recently used entry when over capacity.
    pub fn insert(&self, owner: Address, snapshot: OwnershipSnapshot) {
        let mut guard = self.write();
        let inner = &mut *guard;
        inner.entries.insert(owner, snapshot);
        touch(&mut inner.recency, owner);
        while inner.entries.len() > self.capacity {
            if inner.recency.is_empty() {
                break;
            }
            let evicted = inner.recency.remove(0);
            inner.entries.remove(&evicted);
            debug!(owner = %evicted, "Evicted least-recently-used snapshot");
        }
    }

    /// Whether the entry for `owner` is older than `max_age`. A missing
    /// entry counts as stale. Does not update recency.
    pub fn is_stale(&self, owner: Address, max_age: Duration) -> bool {
        self.read()
            .entries
            .get(&owner)
            .map(|snapshot| snapshot.is_stale(max_age))
            .unwrap_or(true)
    }

    pub fn remove(&self, owner: Address) -> Option<OwnershipSnapshot> {
        let mut guard = self.write();
        let inner = &mut *guard;
        inner.recency.retain(|a| *a != owner);
        inner.entries.remove(&owner)
    }

    pub fn clear(&self) {
        let mut guard = self.write();
        guard.entries.clear();
        guard.recency.clear();
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }
}

fn touch(recency: &mut Vec<Address>, owner: Address) {
    recency.retain(|a| *a != owner);
    recency.push(owner);
}
