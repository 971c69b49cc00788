//! Concurrency behavior of the ownership tracker.
//!
//! Covers:
//! - Fresh-cache serving without re-resolving
//! - Coalescing of concurrent refresh requests (single flight)
//! - Discarding in-flight results after an owner switch
//! - Transfer-triggered refresh producing a superset snapshot
//! - Failure leaving the previous snapshot in place
//! - The signal loop end to end, including shutdown

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use petvault_client::resolver::DiscoveryStrategy;
use petvault_client::tracker::RefreshSignal;
use petvault_client::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::utils::{addr, assert_tokens, init_tracing, tracker_for, wait_for, FakeChain};

const MAX_AGE: Duration = Duration::from_secs(30);

#[tokio::test]
async fn test_snapshot_serves_fresh_cache_without_rescanning() -> Result<()> {
    init_tracing();
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_holder(3, owner);
    chain.set_supply(10);
    let (tracker, _cache) = tracker_for(&chain, DiscoveryStrategy::BruteForce);
    tracker.set_owner(Some(owner));

    let first = tracker.snapshot(MAX_AGE).await?;
    let calls_after_first = chain.owner_call_count();
    let second = tracker.snapshot(MAX_AGE).await?;

    assert_tokens(&first, &[3]);
    assert_eq!(second.tokens, first.tokens);
    assert_eq!(
        chain.owner_call_count(),
        calls_after_first,
        "fresh cache hit must not touch the chain"
    );
    assert_eq!(tracker.stats().started, 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_refreshes_share_one_resolution() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_holder(3, owner);
    chain.set_holder(7, owner);
    chain.set_supply(10);
    chain.set_owner_latency(Duration::from_millis(30));
    let (tracker, _cache) = tracker_for(&chain, DiscoveryStrategy::BruteForce);
    tracker.set_owner(Some(owner));

    let (a, b) = tokio::join!(tracker.refresh(), tracker.refresh());
    let (a, b) = (a?, b?);

    assert_tokens(&a, &[3, 7]);
    assert_eq!(a.tokens, b.tokens);
    assert_eq!(
        chain.owner_call_count(),
        10,
        "second caller must attach to the in-flight scan"
    );
    let stats = tracker.stats();
    assert_eq!(stats.started, 1);
    assert_eq!(stats.coalesced, 1);
    Ok(())
}

#[tokio::test]
async fn test_owner_switch_discards_inflight_result() -> Result<()> {
    init_tracing();
    let chain = FakeChain::new();
    let first_owner = addr(1);
    let second_owner = addr(2);
    chain.set_holder(3, first_owner);
    chain.set_supply(10);
    chain.set_owner_latency(Duration::from_millis(50));
    let (tracker, cache) = tracker_for(&chain, DiscoveryStrategy::BruteForce);
    tracker.set_owner(Some(first_owner));

    let inflight = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.refresh().await })
    };
    // Let the scan get going, then yank the owner out from under it.
    tokio::time::sleep(Duration::from_millis(20)).await;
    tracker.set_owner(Some(second_owner));

    let result = inflight.await?;
    assert!(matches!(result, Err(Error::Superseded)), "got {result:?}");
    assert!(
        cache.get(first_owner).is_none(),
        "stale result must never be committed"
    );
    assert_eq!(tracker.stats().superseded, 1);

    // The new owner resolves cleanly and sees none of the old tokens.
    chain.set_owner_latency(Duration::ZERO);
    let snapshot = tracker.refresh().await?;
    assert!(snapshot.tokens.is_empty());
    assert_eq!(snapshot.owner, second_owner);
    Ok(())
}

#[tokio::test]
async fn test_transfer_triggered_refresh_grows_the_snapshot() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_holder(3, owner);
    chain.set_supply(10);
    let (tracker, _cache) = tracker_for(&chain, DiscoveryStrategy::BruteForce);
    tracker.set_owner(Some(owner));

    let before = tracker.refresh().await?;
    assert_tokens(&before, &[3]);

    // A new mint lands for the observed owner.
    chain.mint(owner, 8);
    let refreshed = tracker.try_refresh().await?;
    assert!(refreshed, "uncontended try_refresh must resolve");

    let after = tracker.cached().expect("snapshot must be cached");
    assert_tokens(&after, &[3, 8]);
    assert!(
        after.tokens.is_superset(&before.tokens),
        "refresh after a mint must grow the set"
    );
    Ok(())
}

#[tokio::test]
async fn test_try_refresh_coalesces_while_resolution_in_flight() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_holder(3, owner);
    chain.set_supply(10);
    chain.set_owner_latency(Duration::from_millis(50));
    let (tracker, _cache) = tracker_for(&chain, DiscoveryStrategy::BruteForce);
    tracker.set_owner(Some(owner));

    let inflight = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(15)).await;

    let ran = tracker.try_refresh().await?;
    assert!(!ran, "try_refresh must bail while a resolution is running");
    assert_eq!(tracker.stats().coalesced, 1);

    let snapshot = inflight.await??;
    assert_tokens(&snapshot, &[3]);
    assert_eq!(tracker.stats().started, 1);
    Ok(())
}

#[tokio::test]
async fn test_clearing_the_owner_drops_the_cache_entry() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_holder(3, owner);
    chain.set_supply(10);
    let (tracker, cache) = tracker_for(&chain, DiscoveryStrategy::BruteForce);
    tracker.set_owner(Some(owner));
    tracker.refresh().await?;
    assert!(cache.get(owner).is_some());

    tracker.set_owner(None);

    assert!(cache.get(owner).is_none(), "disconnect must clear the entry");
    assert!(tracker.cached().is_none());
    let err = tracker.snapshot(MAX_AGE).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err}");
    Ok(())
}

#[tokio::test]
async fn test_failed_refresh_preserves_previous_snapshot() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_holder(3, owner);
    chain.set_supply(10);
    let (tracker, _cache) = tracker_for(&chain, DiscoveryStrategy::BruteForce);
    tracker.set_owner(Some(owner));
    tracker.refresh().await?;

    chain
        .fail_balance
        .store(true, std::sync::atomic::Ordering::Relaxed);
    let err = tracker.refresh().await.unwrap_err();

    assert!(matches!(err, Error::Rpc(_)), "got {err}");
    let cached = tracker.cached().expect("previous snapshot must survive");
    assert_tokens(&cached, &[3]);
    assert_eq!(tracker.stats().failed, 1);
    Ok(())
}

#[tokio::test]
async fn test_signal_loop_refreshes_on_signal_and_shuts_down() -> Result<()> {
    init_tracing();
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_holder(3, owner);
    chain.set_supply(10);
    let (tracker, _cache) = tracker_for(&chain, DiscoveryStrategy::BruteForce);
    tracker.set_owner(Some(owner));

    let (signal_tx, signal_rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    let handle = {
        let tracker = Arc::clone(&tracker);
        let cancel = cancel.clone();
        tokio::spawn(async move { tracker.run_signal_loop(signal_rx, cancel).await })
    };

    signal_tx.send(RefreshSignal::Manual).await?;
    let refreshed = {
        let tracker = Arc::clone(&tracker);
        wait_for(Duration::from_secs(1), move || tracker.stats().completed >= 1).await
    };
    assert!(refreshed, "signal must drive a resolution");
    assert_tokens(&tracker.cached().expect("snapshot cached"), &[3]);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle).await??;
    Ok(())
}
