//! Session-scoped ownership tracking: one observed address, one cache entry,
//! one resolution in flight at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use alloy_primitives::Address;
use petvault_types::OwnershipSnapshot;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::SnapshotCache;
use crate::error::Error;
use crate::resolver::OwnershipResolver;

/// Invalidate-and-refetch trigger. Every producer funnels into the same
/// channel so refreshes coalesce regardless of what caused them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshSignal {
    /// A Transfer touching the observed address landed on chain.
    TransferObserved,
    /// Periodic fallback while log polling is degraded.
    Stale,
    /// Explicit request from the embedding application.
    Manual,
}

/// Counter snapshot for diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerStats {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub coalesced: u64,
    pub superseded: u64,
}

/// Serializes resolutions for the observed address and owns its snapshot
/// cache entry.
///
/// Two rules keep concurrent use sane: at most one resolution runs at a time
/// (later requests attach to the in-flight result), and a resolution started
/// under an old owner never commits. The second is enforced with an epoch
/// counter bumped on every owner change; a completed resolution compares
/// epochs before writing to the cache and reports [`Error::Superseded`] when
/// it lost the race.
pub struct OwnershipTracker {
    resolver: OwnershipResolver,
    cache: Arc<SnapshotCache>,
    owner: StdMutex<Option<Address>>,
    epoch: AtomicU64,
    resolve_lock: Mutex<()>,
    resolutions_started: AtomicU64,
    resolutions_completed: AtomicU64,
    resolutions_failed: AtomicU64,
    coalesced_triggers: AtomicU64,
    superseded_results: AtomicU64,
}

impl OwnershipTracker {
    pub fn new(resolver: OwnershipResolver, cache: Arc<SnapshotCache>) -> Self {
        Self {
            resolver,
            cache,
            owner: StdMutex::new(None),
            epoch: AtomicU64::new(0),
            resolve_lock: Mutex::new(()),
            resolutions_started: AtomicU64::new(0),
            resolutions_completed: AtomicU64::new(0),
            resolutions_failed: AtomicU64::new(0),
            coalesced_triggers: AtomicU64::new(0),
            superseded_results: AtomicU64::new(0),
        }
    }

    /// Switch the observed address. Bumps the epoch so any in-flight
    /// resolution for the previous owner is discarded on completion, and
    /// drops the previous owner's cache entry.
    pub fn set_owner(&self, new_owner: Option<Address>) {
        let previous = {
            let mut slot = self.owner.lock().unwrap_or_else(|e| e.into_inner());
            let previous = *slot;
            if previous == new_owner {
                return;
            }
            *slot = new_owner;
            self.epoch.fetch_add(1, Ordering::SeqCst);
            previous
        };
        if let Some(prev) = previous {
            self.cache.remove(prev);
        }
        match new_owner {
            Some(owner) => info!(owner = %owner, "Session owner changed"),
            None => info!("Session owner cleared"),
        }
    }

    pub fn owner(&self) -> Option<Address> {
        *self.owner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached snapshot for the current owner, if any. Never resolves.
    pub fn cached(&self) -> Option<OwnershipSnapshot> {
        self.owner().and_then(|owner| self.cache.get(owner))
    }

    /// Snapshot for the current owner, served from cache when younger than
    /// `max_age`, resolved otherwise.
    pub async fn snapshot(&self, max_age: Duration) -> Result<OwnershipSnapshot, Error> {
        let owner = self.require_owner()?;
        if let Some(snapshot) = self.cache.get(owner) {
            if !snapshot.is_stale(max_age) {
                return Ok(snapshot);
            }
        }
        let _flight = self.resolve_lock.lock().await;
        if self.owner() != Some(owner) {
            self.superseded_results.fetch_add(1, Ordering::Relaxed);
            return Err(Error::Superseded);
        }
        // A resolution that finished while this caller waited for the lock
        // may have refreshed the entry already.
        if let Some(snapshot) = self.cache.get(owner) {
            if !snapshot.is_stale(max_age) {
                self.coalesced_triggers.fetch_add(1, Ordering::Relaxed);
                return Ok(snapshot);
            }
        }
        self.resolve_and_commit(owner).await
    }

    /// Force a resolution for the current owner. A caller that was queued
    /// behind an in-flight resolution attaches to its result instead of
    /// scanning again.
    pub async fn refresh(&self) -> Result<OwnershipSnapshot, Error> {
        let owner = self.require_owner()?;
        let requested_at = Instant::now();
        let _flight = self.resolve_lock.lock().await;
        if self.owner() != Some(owner) {
            self.superseded_results.fetch_add(1, Ordering::Relaxed);
            return Err(Error::Superseded);
        }
        if let Some(snapshot) = self.cache.get(owner) {
            if snapshot.resolved_at >= requested_at {
                self.coalesced_triggers.fetch_add(1, Ordering::Relaxed);
                debug!(owner = %owner, "Refresh satisfied by resolution that ran while waiting");
                return Ok(snapshot);
            }
        }
        self.resolve_and_commit(owner).await
    }

    /// Non-blocking refresh used by signal producers. Returns `Ok(false)`
    /// without touching the chain when no owner is set or a resolution is
    /// already in flight.
    pub async fn try_refresh(&self) -> Result<bool, Error> {
        let Some(owner) = self.owner() else {
            return Ok(false);
        };
        let Ok(_flight) = self.resolve_lock.try_lock() else {
            self.coalesced_triggers.fetch_add(1, Ordering::Relaxed);
            debug!(owner = %owner, "Refresh coalesced into in-flight resolution");
            return Ok(false);
        };
        self.resolve_and_commit(owner).await.map(|_| true)
    }

    /// Consume refresh signals until cancelled or the channel closes.
    pub async fn run_signal_loop(
        self: &Arc<Self>,
        mut signals: mpsc::Receiver<RefreshSignal>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Refresh signal loop shutting down");
                    return;
                }
                received = signals.recv() => {
                    let Some(signal) = received else {
                        info!("Refresh signal channel closed");
                        return;
                    };
                    debug!(signal = ?signal, "Refresh signal received");
                    match self.try_refresh().await {
                        Ok(_) => {}
                        Err(Error::Superseded) => {
                            debug!("Signal-driven refresh superseded by owner change");
                        }
                        Err(e) => warn!(error = %e, "Signal-driven refresh failed"),
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            started: self.resolutions_started.load(Ordering::Relaxed),
            completed: self.resolutions_completed.load(Ordering::Relaxed),
            failed: self.resolutions_failed.load(Ordering::Relaxed),
            coalesced: self.coalesced_triggers.load(Ordering::Relaxed),
            superseded: self.superseded_results.load(Ordering::Relaxed),
        }
    }

    fn require_owner(&self) -> Result<Address, Error> {
        self.owner()
            .ok_or_else(|| Error::Config("no session owner set".into()))
    }

    /// Runs one resolution under the flight lock and commits the result only
    /// if the session has not moved on underneath it.
    async fn resolve_and_commit(&self, owner: Address) -> Result<OwnershipSnapshot, Error> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.resolutions_started.fetch_add(1, Ordering::Relaxed);
        match self.resolver.resolve(owner).await {
            Ok(snapshot) => {
                if self.epoch.load(Ordering::SeqCst) != epoch || self.owner() != Some(owner) {
                    self.superseded_results.fetch_add(1, Ordering::Relaxed);
                    info!(owner = %owner, "Discarding resolution result, session moved on");
                    return Err(Error::Superseded);
                }
                self.cache.insert(owner, snapshot.clone());
                self.resolutions_completed.fetch_add(1, Ordering::Relaxed);
                Ok(snapshot)
            }
            Err(e) => {
                // The previous snapshot, if any, stays in the cache.
                self.resolutions_failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }
}
