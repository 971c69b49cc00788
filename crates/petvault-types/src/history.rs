//! Medical-history records nested under a pet token.

use alloy_primitives::Address;

use crate::TokenId;

/// One history record minted against a parent pet token.
///
/// `file_type` is the coarse upload classification ("image" or "document");
/// `timestamp` is the chain's seconds-since-epoch mint time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItem {
    pub title: String,
    pub description: String,
    pub file_uri: String,
    pub file_type: String,
    pub timestamp: u64,
    pub parent_contract: Address,
    pub parent_token_id: TokenId,
}
