//! Shared types and pure-logic utilities for PetVault.
//! Zero async/network dependency, usable by the client and by test harnesses.

mod address;
mod error;
mod event;
mod history;
mod metadata;
mod snapshot;

pub use address::parse_address;
pub use error::{InvalidAddress, MetadataError};
pub use event::TransferEvent;
pub use history::HistoryItem;
pub use metadata::{decode_token_uri, MetadataAttribute, TokenMetadata};
pub use snapshot::OwnershipSnapshot;

/// Token identifier within an ERC-721 contract.
pub type TokenId = alloy_primitives::U256;
