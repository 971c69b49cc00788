//! Ownership discovery against a programmable fake chain.
//!
//! Covers:
//! - Zero-balance short circuit (no ownerOf or totalSupply traffic)
//! - Batched scan: early exit at balance, candidate batching, skipped reverts
//! - Fallback ceiling when totalSupply is unsupported
//! - Transfer-log walk: newest-event-wins, window descent, genesis stop
//! - Auto strategy fallback from logs to scan
//! - Whole-resolution failure and timeout behavior

use std::sync::atomic::Ordering;
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::Result;
use petvault_client::resolver::{DiscoveryStrategy, OwnershipResolver, ResolverSettings};
use petvault_client::Error;
use petvault_types::TransferEvent;

use crate::utils::{
    addr, assert_tokens, init_tracing, resolver_for, test_settings, token, FakeChain,
};

// ── Batched ownerOf scan ────────────────────────────────────────────────────

#[tokio::test]
async fn test_zero_balance_short_circuits() -> Result<()> {
    init_tracing();
    let chain = FakeChain::new();
    chain.set_supply(50);
    let resolver = resolver_for(&chain, DiscoveryStrategy::BruteForce);

    let snapshot = resolver.resolve(addr(1)).await?;

    assert!(snapshot.tokens.is_empty());
    assert!(!snapshot.partial);
    assert_eq!(
        chain.owner_call_count(),
        0,
        "zero balance must not probe ownerOf"
    );
    assert_eq!(
        chain.supply_calls.load(Ordering::Relaxed),
        0,
        "zero balance must not query totalSupply"
    );
    Ok(())
}

#[tokio::test]
async fn test_scan_stops_once_balance_is_found() -> Result<()> {
    init_tracing();
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_holder(3, owner);
    chain.set_holder(7, owner);
    chain.set_supply(10);
    let resolver = resolver_for(&chain, DiscoveryStrategy::BruteForce);

    let snapshot = resolver.resolve(owner).await?;

    assert_tokens(&snapshot, &[3, 7]);
    assert!(!snapshot.partial);
    // Both tokens sit in the first two batches of five; candidates 10..
    // must never be probed.
    assert_eq!(chain.owner_call_count(), 10);
    Ok(())
}

#[tokio::test]
async fn test_early_exit_skips_remaining_batches() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_holder(0, owner);
    chain.set_holder(1, owner);
    chain.set_supply(100);
    let resolver = resolver_for(&chain, DiscoveryStrategy::BruteForce);

    let snapshot = resolver.resolve(owner).await?;

    assert_tokens(&snapshot, &[0, 1]);
    assert_eq!(
        chain.owner_call_count(),
        5,
        "first batch already satisfies the balance"
    );
    Ok(())
}

#[tokio::test]
async fn test_scan_accumulates_ascending_across_batches() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    for id in [12, 3, 7] {
        chain.set_holder(id, owner);
    }
    chain.set_supply(15);
    let resolver = resolver_for(&chain, DiscoveryStrategy::BruteForce);

    let snapshot = resolver.resolve(owner).await?;

    assert_tokens(&snapshot, &[3, 7, 12]);
    Ok(())
}

#[tokio::test]
async fn test_scan_skips_tokens_held_by_others_and_gaps() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    let other = addr(2);
    chain.set_holder(0, other);
    chain.set_holder(2, owner);
    // ids 1, 3, 4 were never minted and revert on ownerOf.
    chain.set_supply(5);
    let resolver = resolver_for(&chain, DiscoveryStrategy::BruteForce);

    let snapshot = resolver.resolve(owner).await?;

    assert_tokens(&snapshot, &[2]);
    assert!(!snapshot.partial);
    assert_eq!(chain.owner_call_count(), 5, "every candidate gets one probe");
    Ok(())
}

#[tokio::test]
async fn test_missing_total_supply_scans_up_to_fallback_ceiling() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_holder(2, owner);
    chain.set_holder(25, owner);
    chain.supply_unsupported.store(true, Ordering::Relaxed);
    let settings = ResolverSettings {
        fallback_ceiling: 20,
        ..test_settings(DiscoveryStrategy::BruteForce)
    };
    let resolver = OwnershipResolver::new(chain.clone(), settings);

    let snapshot = resolver.resolve(owner).await?;

    // Token 25 sits beyond the ceiling: it is missed and the snapshot says so.
    assert_tokens(&snapshot, &[2]);
    assert!(snapshot.partial, "capped scan must be marked partial");
    assert_eq!(chain.owner_call_count(), 20, "scan stops at the ceiling");
    Ok(())
}

#[tokio::test]
async fn test_scan_short_of_balance_marks_partial() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_holder(3, owner);
    chain.set_holder(7, owner);
    chain.set_holder(15, owner);
    // Reported supply hides token 15 from the scan.
    chain.set_supply(10);
    let resolver = resolver_for(&chain, DiscoveryStrategy::BruteForce);

    let snapshot = resolver.resolve(owner).await?;

    assert_tokens(&snapshot, &[3, 7]);
    assert!(snapshot.partial);
    Ok(())
}

#[tokio::test]
async fn test_balance_failure_fails_the_resolution() {
    let chain = FakeChain::new();
    chain.fail_balance.store(true, Ordering::Relaxed);
    let resolver = resolver_for(&chain, DiscoveryStrategy::BruteForce);

    let err = resolver.resolve(addr(1)).await.unwrap_err();

    assert!(matches!(err, Error::Rpc(_)), "got {err}");
    assert_eq!(chain.owner_call_count(), 0);
}

#[tokio::test]
async fn test_resolution_times_out_against_a_slow_chain() {
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_holder(3, owner);
    chain.set_supply(10);
    chain.set_owner_latency(Duration::from_millis(200));
    let settings = ResolverSettings {
        resolve_timeout: Duration::from_millis(50),
        ..test_settings(DiscoveryStrategy::BruteForce)
    };
    let resolver = OwnershipResolver::new(chain.clone(), settings);

    let err = resolver.resolve(owner).await.unwrap_err();

    assert!(matches!(err, Error::Resolution(_)), "got {err}");
}

// ── Transfer-log walk ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_log_walk_discovers_minted_tokens_without_probing() -> Result<()> {
    init_tracing();
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_block(90);
    chain.mint(owner, 3);
    chain.mint(owner, 7);
    let resolver = resolver_for(&chain, DiscoveryStrategy::TransferLogs);

    let snapshot = resolver.resolve(owner).await?;

    assert_tokens(&snapshot, &[3, 7]);
    assert!(!snapshot.partial);
    assert_eq!(
        chain.owner_call_count(),
        0,
        "log walk must not fall back to ownerOf probes"
    );
    Ok(())
}

#[tokio::test]
async fn test_log_walk_excludes_tokens_transferred_away() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    let buyer = addr(2);
    chain.set_block(80);
    chain.mint(owner, 1);
    chain.mint(owner, 5);
    chain.transfer(owner, buyer, 5);

    let resolver = resolver_for(&chain, DiscoveryStrategy::TransferLogs);
    let snapshot = resolver.resolve(owner).await?;

    assert_tokens(&snapshot, &[1]);
    assert!(!snapshot.partial);
    Ok(())
}

#[tokio::test]
async fn test_log_walk_orders_same_block_events_by_log_index() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    let buyer = addr(2);
    // Token 5 came in and left again within block 100; the higher log
    // index is the later event and must win.
    chain.set_holder(1, owner);
    chain.push_log(TransferEvent {
        from: Address::ZERO,
        to: owner,
        token_id: token(1),
        block_number: 95,
        log_index: 0,
    });
    chain.push_log(TransferEvent {
        from: Address::ZERO,
        to: owner,
        token_id: token(5),
        block_number: 100,
        log_index: 0,
    });
    chain.push_log(TransferEvent {
        from: owner,
        to: buyer,
        token_id: token(5),
        block_number: 100,
        log_index: 1,
    });
    chain.set_block(100);

    let resolver = resolver_for(&chain, DiscoveryStrategy::TransferLogs);
    let snapshot = resolver.resolve(owner).await?;

    assert_tokens(&snapshot, &[1]);
    Ok(())
}

#[tokio::test]
async fn test_log_walk_stops_descending_once_balance_reached() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_block(99);
    chain.mint(owner, 4);

    let resolver = resolver_for(&chain, DiscoveryStrategy::TransferLogs);
    let snapshot = resolver.resolve(owner).await?;

    assert_tokens(&snapshot, &[4]);
    // One window, queried in both directions; older windows never touched.
    assert_eq!(chain.log_call_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_log_walk_reaches_genesis_and_marks_partial() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    // The holder entry gives a balance of one, but no log ever mentions it.
    chain.set_holder(9, owner);
    chain.set_block(25);

    let resolver = resolver_for(&chain, DiscoveryStrategy::TransferLogs);
    let snapshot = resolver.resolve(owner).await?;

    assert!(snapshot.tokens.is_empty());
    assert!(snapshot.partial, "genesis reached short of balance");
    // Windows [16,25], [6,15], [0,5], two directions each.
    assert_eq!(chain.log_call_count(), 6);
    Ok(())
}

// ── Auto strategy ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_auto_prefers_logs_and_never_scans_when_they_work() -> Result<()> {
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_block(50);
    chain.mint(owner, 2);

    let resolver = resolver_for(&chain, DiscoveryStrategy::Auto);
    let snapshot = resolver.resolve(owner).await?;

    assert_tokens(&snapshot, &[2]);
    assert_eq!(chain.owner_call_count(), 0);
    assert_eq!(chain.supply_calls.load(Ordering::Relaxed), 0);
    Ok(())
}

#[tokio::test]
async fn test_auto_falls_back_to_scan_when_logs_fail() -> Result<()> {
    init_tracing();
    let chain = FakeChain::new();
    let owner = addr(1);
    chain.set_holder(3, owner);
    chain.set_supply(10);
    chain.set_block(50);
    chain.fail_logs.store(true, Ordering::Relaxed);

    let resolver = resolver_for(&chain, DiscoveryStrategy::Auto);
    let snapshot = resolver.resolve(owner).await?;

    assert_tokens(&snapshot, &[3]);
    assert!(!snapshot.partial);
    assert!(chain.log_call_count() >= 1, "log path must be attempted");
    assert!(chain.owner_call_count() > 0, "scan fallback must run");
    Ok(())
}
