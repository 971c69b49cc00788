//! # PetVault Client
//!
//! Client library for minting and viewing pet-ownership NFTs, and the
//! medical-history records nested under them, on a single EVM test network
//! with no indexing service.
//!
//! The embedding application drives everything through [`PetVault`]:
//! ownership discovery (batched `ownerOf` scans or Transfer-log walks),
//! freshness-cached snapshots, transfer-driven refresh, token metadata,
//! and the mint and pinning write paths. Transaction signing stays outside
//! the library behind the [`writer::ChainWriter`] seam.

pub mod cache;
pub mod config;
pub mod contract;
mod error;
pub mod pinning;
pub mod reader;
pub mod resolver;
pub mod rpc;
pub mod tracker;
pub mod vault;
pub mod watcher;
pub mod writer;

pub use config::Config;
pub use error::Error;
pub use resolver::{DiscoveryStrategy, OwnershipResolver, ResolverSettings};
pub use tracker::{OwnershipTracker, RefreshSignal};
pub use vault::{BackgroundTasks, MintPetRequest, NewHistoryItem, PetRecord, PetVault};
