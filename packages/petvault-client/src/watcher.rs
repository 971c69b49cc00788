//! Polls Transfer logs and turns relevant events into refresh signals.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::reader::{ChainReader, TransferFilter};
use crate::tracker::{OwnershipTracker, RefreshSignal};

/// Consecutive poll failures before the watcher degrades to emitting
/// [`RefreshSignal::Stale`] on its interval.
const DEGRADE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    /// Poll interval for new blocks and logs.
    pub interval: Duration,
    /// Consecutive failures before degrading to blind invalidation.
    pub degrade_threshold: u32,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(4),
            degrade_threshold: DEGRADE_THRESHOLD,
        }
    }
}

/// Follows the pet contract's Transfer stream over plain `eth_getLogs`
/// polling and emits a refresh signal whenever an event touches the
/// observed address.
///
/// When log queries keep failing the watcher keeps the session moving by
/// emitting `Stale` every interval instead, so snapshots still refresh,
/// just without event precision. It recovers to event-driven signalling on
/// the first successful poll.
pub struct TransferWatcher {
    reader: Arc<dyn ChainReader>,
    tracker: Arc<OwnershipTracker>,
    signals: mpsc::Sender<RefreshSignal>,
    settings: WatcherSettings,
    polls: AtomicU64,
    events_seen: AtomicU64,
    events_matched: AtomicU64,
    consecutive_failures: AtomicU32,
}

impl TransferWatcher {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        tracker: Arc<OwnershipTracker>,
        signals: mpsc::Sender<RefreshSignal>,
        settings: WatcherSettings,
    ) -> Self {
        Self {
            reader,
            tracker,
            signals,
            settings,
            polls: AtomicU64::new(0),
            events_seen: AtomicU64::new(0),
            events_matched: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Poll until cancelled. The first successful poll only anchors the
    /// block cursor; history before the watcher started is the resolver's
    /// job, not the watcher's.
    pub async fn run(self: &Arc<Self>, cancel: CancellationToken) {
        info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            "Transfer watcher started"
        );
        let mut cursor: Option<u64> = None;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = cancel.cancelled() => {
                    info!("Transfer watcher shutting down");
                    return;
                }
            }
            match self.poll_once(&mut cursor).await {
                Ok(matched) => {
                    let failures = self.consecutive_failures.swap(0, Ordering::Relaxed);
                    if failures >= self.settings.degrade_threshold {
                        info!("Log polling recovered, resuming event-driven refresh");
                    }
                    if matched {
                        self.emit(RefreshSignal::TransferObserved);
                    }
                }
                Err(e) => {
                    let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(error = %e, failures, "Transfer log poll failed");
                    if failures >= self.settings.degrade_threshold {
                        // Blind invalidation keeps snapshots moving while
                        // the log path is down.
                        self.emit(RefreshSignal::Stale);
                    }
                }
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) >= self.settings.degrade_threshold
    }

    pub fn poll_count(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    /// Transfer events decoded from polled windows, matched or not.
    pub fn seen_count(&self) -> u64 {
        self.events_seen.load(Ordering::Relaxed)
    }

    pub fn matched_count(&self) -> u64 {
        self.events_matched.load(Ordering::Relaxed)
    }

    async fn poll_once(&self, cursor: &mut Option<u64>) -> Result<bool, Error> {
        let latest = self.reader.block_number().await?;
        let from = match *cursor {
            Some(from) => from,
            None => {
                *cursor = Some(latest + 1);
                debug!(latest, "Anchored watch cursor");
                return Ok(false);
            }
        };
        if latest < from {
            return Ok(false);
        }
        let events = self
            .reader
            .transfer_logs(from, latest, TransferFilter::default())
            .await?;
        *cursor = Some(latest + 1);
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.events_seen.fetch_add(events.len() as u64, Ordering::Relaxed);
        let Some(observed) = self.tracker.owner() else {
            return Ok(false);
        };
        let matched = events.iter().filter(|e| e.touches(observed)).count() as u64;
        if matched > 0 {
            self.events_matched.fetch_add(matched, Ordering::Relaxed);
            info!(
                owner = %observed,
                matched,
                from_block = from,
                to_block = latest,
                "Observed transfers touching session owner"
            );
        }
        Ok(matched > 0)
    }

    fn emit(&self, signal: RefreshSignal) {
        // A full channel means refreshes are already queued; dropping the
        // signal loses nothing.
        if self.signals.try_send(signal).is_err() {
            debug!(signal = ?signal, "Signal channel unavailable, dropping");
        }
    }
}
