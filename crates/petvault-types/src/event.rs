//! Ownership-transfer events decoded from chain logs.

use alloy_primitives::Address;

use crate::TokenId;

/// One ERC-721 `Transfer(from, to, tokenId)` log.
///
/// `block_number` and `log_index` order events chain-wide; the newest event
/// for a token id decides its current owner during log-based discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub token_id: TokenId,
    pub block_number: u64,
    pub log_index: u64,
}

impl TransferEvent {
    /// Transfers from the zero address are mints.
    pub fn is_mint(&self) -> bool {
        self.from == Address::ZERO
    }

    /// True when the event moves a token into or out of `address`.
    pub fn touches(&self, address: Address) -> bool {
        self.from == address || self.to == address
    }
}
