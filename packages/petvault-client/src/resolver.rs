//! Ownership discovery without an indexer.
//!
//! The pet contract exposes no `tokenOfOwnerByIndex`, so the set of tokens an
//! address owns has to be reconstructed from primitive reads. Two strategies
//! exist: a batched `ownerOf` scan over the candidate ID space, and a walk
//! over historical Transfer logs. `Auto` tries logs first and falls back to
//! the scan when the node rejects or fails the log queries.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use futures::future::join_all;
use petvault_types::{OwnershipSnapshot, TokenId};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::reader::{ChainReader, TransferFilter};

/// How owned token IDs are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DiscoveryStrategy {
    /// Batched `ownerOf` probes over `[0, ceiling)`.
    #[serde(rename = "scan")]
    BruteForce,
    /// Descending Transfer-log windows from the chain head.
    #[serde(rename = "logs")]
    TransferLogs,
    /// Logs first, brute-force scan when the log path fails.
    #[serde(rename = "auto")]
    Auto,
}

/// Tunables for a resolution run.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub strategy: DiscoveryStrategy,
    /// Concurrent `ownerOf` probes per batch.
    pub batch_size: usize,
    /// Scan bound when the contract does not report `totalSupply`.
    pub fallback_ceiling: u64,
    /// Pause between batches and between log windows.
    pub batch_delay: Duration,
    /// Blocks per Transfer-log window.
    pub log_window: u64,
    /// Budget for one whole resolution.
    pub resolve_timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            strategy: DiscoveryStrategy::Auto,
            batch_size: 5,
            fallback_ceiling: 1000,
            batch_delay: Duration::from_millis(100),
            log_window: 10_000,
            resolve_timeout: Duration::from_secs(60),
        }
    }
}

impl ResolverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            strategy: config.strategy,
            batch_size: config.batch_size.max(1),
            fallback_ceiling: config.fallback_ceiling,
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            log_window: config.log_window.max(1),
            resolve_timeout: Duration::from_secs(config.resolve_timeout_secs),
        }
    }
}

/// Rebuilds the owned-token set for one address from chain reads.
///
/// Stateless between calls; every `resolve` produces a fresh
/// [`OwnershipSnapshot`]. Single-flight and cache concerns live in the
/// tracker, not here.
pub struct OwnershipResolver {
    reader: Arc<dyn ChainReader>,
    settings: ResolverSettings,
}

impl OwnershipResolver {
    pub fn new(reader: Arc<dyn ChainReader>, settings: ResolverSettings) -> Self {
        Self { reader, settings }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Resolve the full owned-token set for `owner`.
    ///
    /// Fails with [`Error::Resolution`] when the run exceeds its time budget;
    /// transport failures propagate as [`Error::Rpc`]. Callers keep serving
    /// their previous snapshot on failure.
    pub async fn resolve(&self, owner: Address) -> Result<OwnershipSnapshot, Error> {
        let budget = self.settings.resolve_timeout;
        match tokio::time::timeout(budget, self.resolve_inner(owner)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Resolution(format!(
                "resolution for {owner} exceeded its {budget:?} budget"
            ))),
        }
    }

    async fn resolve_inner(&self, owner: Address) -> Result<OwnershipSnapshot, Error> {
        let balance = self.reader.balance_of(owner).await?;
        if balance.is_zero() {
            // Nothing to find, so no ownerOf or totalSupply traffic at all.
            debug!(owner = %owner, "Balance is zero, returning empty snapshot");
            return Ok(OwnershipSnapshot::empty(owner));
        }
        let expected = usize::try_from(balance).unwrap_or(usize::MAX);
        info!(
            owner = %owner,
            balance = expected,
            strategy = ?self.settings.strategy,
            "Resolving owned tokens"
        );
        let snapshot = match self.settings.strategy {
            DiscoveryStrategy::BruteForce => self.scan(owner, expected).await?,
            DiscoveryStrategy::TransferLogs => self.walk_logs(owner, expected).await?,
            DiscoveryStrategy::Auto => match self.walk_logs(owner, expected).await {
                Ok(snapshot) => snapshot,
                Err(Error::Rpc(reason)) => {
                    warn!(
                        owner = %owner,
                        error = %reason,
                        "Log discovery failed, falling back to ownerOf scan"
                    );
                    self.scan(owner, expected).await?
                }
                Err(e) => return Err(e),
            },
        };
        info!(
            owner = %owner,
            found = snapshot.tokens.len(),
            partial = snapshot.partial,
            "Ownership resolution complete"
        );
        Ok(snapshot)
    }

    /// Probe `ownerOf` for every candidate ID in `[0, ceiling)`, a batch at
    /// a time, stopping as soon as `expected` tokens are confirmed.
    async fn scan(&self, owner: Address, expected: usize) -> Result<OwnershipSnapshot, Error> {
        let ceiling = match self.reader.total_supply().await {
            Ok(supply) => u64::try_from(supply).unwrap_or(u64::MAX),
            Err(Error::Unsupported(what)) => {
                warn!(
                    what,
                    ceiling = self.settings.fallback_ceiling,
                    "totalSupply unavailable, scanning up to fallback ceiling"
                );
                self.settings.fallback_ceiling
            }
            Err(e) => return Err(e),
        };
        let batch = self.settings.batch_size as u64;
        let mut found: BTreeSet<TokenId> = BTreeSet::new();
        let mut start = 0u64;
        while start < ceiling {
            let end = ceiling.min(start + batch);
            let probes = (start..end).map(|id| self.probe(U256::from(id)));
            for result in join_all(probes).await {
                if let Some((token_id, holder)) = result? {
                    if holder == owner {
                        found.insert(token_id);
                    }
                }
            }
            debug!(start, end, found = found.len(), "Scanned candidate batch");
            if found.len() >= expected {
                break;
            }
            start = end;
            // Pace the node, but only when another batch is coming.
            if start < ceiling && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }
        let partial = found.len() != expected;
        if partial {
            warn!(
                owner = %owner,
                found = found.len(),
                expected,
                "Scan ended short of the reported balance, marking snapshot partial"
            );
        }
        Ok(OwnershipSnapshot::new(owner, found, partial))
    }

    /// One `ownerOf` probe. A nonexistent token reverts on chain; that is an
    /// expected miss during scanning, not a failure.
    async fn probe(&self, token_id: TokenId) -> Result<Option<(TokenId, Address)>, Error> {
        match self.reader.owner_of(token_id).await {
            Ok(holder) => Ok(Some((token_id, holder))),
            Err(Error::TokenNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Walk Transfer logs in descending block windows from the head.
    ///
    /// Both directions are queried per window: an incoming transfer alone
    /// says nothing once the token was later sent away, so the newest event
    /// per token ID decides whether it is currently held.
    async fn walk_logs(&self, owner: Address, expected: usize) -> Result<OwnershipSnapshot, Error> {
        let latest = self.reader.block_number().await?;
        let window = self.settings.log_window;
        let mut owned: BTreeSet<TokenId> = BTreeSet::new();
        let mut decided: BTreeSet<TokenId> = BTreeSet::new();
        let mut windows_walked = 0u64;
        let mut high = latest;
        loop {
            let low = high.saturating_sub(window.saturating_sub(1));
            let incoming = self
                .reader
                .transfer_logs(
                    low,
                    high,
                    TransferFilter {
                        from: None,
                        to: Some(owner),
                    },
                )
                .await?;
            let outgoing = self
                .reader
                .transfer_logs(
                    low,
                    high,
                    TransferFilter {
                        from: Some(owner),
                        to: None,
                    },
                )
                .await?;
            let mut events = incoming;
            events.extend(outgoing);
            // Newest first within the window; newer windows were already
            // consumed, so the first verdict per token ID stands.
            events.sort_by(|a, b| {
                (b.block_number, b.log_index).cmp(&(a.block_number, a.log_index))
            });
            for event in events {
                if decided.insert(event.token_id) && event.to == owner {
                    owned.insert(event.token_id);
                }
            }
            windows_walked += 1;
            debug!(
                low,
                high,
                owned = owned.len(),
                "Walked transfer-log window"
            );
            if owned.len() >= expected || low == 0 {
                break;
            }
            high = low - 1;
            if !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }
        let partial = owned.len() != expected;
        if partial {
            warn!(
                owner = %owner,
                found = owned.len(),
                expected,
                windows_walked,
                "Log walk reached genesis short of the reported balance"
            );
        }
        Ok(OwnershipSnapshot::new(owner, owned, partial))
    }
}
