//! Resolved ownership state for one observed address.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use alloy_primitives::Address;

use crate::TokenId;

/// Token IDs confirmed owned by `owner` as of `resolved_at`.
///
/// Replaced whole on every successful resolution, never mutated in place.
/// `partial` marks a snapshot whose token count did not match the reported
/// balance at scan end; it must not be presented as complete.
#[derive(Debug, Clone)]
pub struct OwnershipSnapshot {
    pub owner: Address,
    pub tokens: BTreeSet<TokenId>,
    pub partial: bool,
    pub resolved_at: Instant,
}

impl OwnershipSnapshot {
    pub fn new(owner: Address, tokens: BTreeSet<TokenId>, partial: bool) -> Self {
        Self {
            owner,
            tokens,
            partial,
            resolved_at: Instant::now(),
        }
    }

    /// Empty snapshot for a zero-balance owner.
    pub fn empty(owner: Address) -> Self {
        Self::new(owner, BTreeSet::new(), false)
    }

    pub fn contains(&self, token_id: TokenId) -> bool {
        self.tokens.contains(&token_id)
    }

    pub fn age(&self) -> Duration {
        self.resolved_at.elapsed()
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }
}
