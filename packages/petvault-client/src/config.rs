//! PetVault client configuration.

use petvault_types::parse_address;
use serde::Deserialize;

use crate::resolver::DiscoveryStrategy;

/// Configuration for one PetVault session.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Primary JSON-RPC endpoint.
    #[serde(default = "defaults::rpc_url")]
    pub rpc_url: String,

    /// Fallback endpoint. Same as the primary by default, in which case
    /// failover degenerates to a retry; override for real redundancy.
    #[serde(default = "defaults::fallback_rpc_url")]
    pub fallback_rpc_url: String,

    /// Expected chain id; verified against `eth_chainId` at connect time.
    #[serde(default = "defaults::chain_id")]
    pub chain_id: u64,

    /// Pet NFT contract address.
    #[serde(default = "defaults::pet_contract")]
    pub pet_contract: String,

    /// History NFT contract address; empty disables history operations.
    #[serde(default)]
    pub history_contract: String,

    #[serde(default = "defaults::strategy")]
    pub strategy: DiscoveryStrategy,

    /// Concurrent `ownerOf` calls per scan batch.
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Scan ceiling when the contract exposes no `totalSupply`. Known
    /// limitation: tokens with ids at or beyond the ceiling are missed, and
    /// the resulting snapshot is marked partial.
    #[serde(default = "defaults::fallback_ceiling")]
    pub fallback_ceiling: u64,

    /// Pacing delay between scan batches and log windows.
    #[serde(default = "defaults::batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Block span per `eth_getLogs` window during log-based discovery.
    #[serde(default = "defaults::log_window")]
    pub log_window: u64,

    /// Transfer-watcher poll interval.
    #[serde(default = "defaults::watch_interval_ms")]
    pub watch_interval_ms: u64,

    /// Cached snapshots older than this are re-resolved on demand.
    #[serde(default = "defaults::snapshot_max_age_secs")]
    pub snapshot_max_age_secs: u64,

    #[serde(default = "defaults::cache_capacity")]
    pub cache_capacity: usize,

    /// Per-request HTTP timeout.
    #[serde(default = "defaults::rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    /// Overall budget for one resolution, across all batches.
    #[serde(default = "defaults::resolve_timeout_secs")]
    pub resolve_timeout_secs: u64,

    #[serde(default = "defaults::pinning_endpoint")]
    pub pinning_endpoint: String,

    #[serde(default = "defaults::pinning_gateway")]
    pub pinning_gateway: String,

    /// Bearer JWT for the pinning service; empty disables uploads.
    #[serde(default)]
    pub pinning_jwt: String,

    #[serde(default = "defaults::max_file_bytes")]
    pub max_file_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: defaults::rpc_url(),
            fallback_rpc_url: defaults::fallback_rpc_url(),
            chain_id: defaults::chain_id(),
            pet_contract: defaults::pet_contract(),
            history_contract: String::new(),
            strategy: defaults::strategy(),
            batch_size: defaults::batch_size(),
            fallback_ceiling: defaults::fallback_ceiling(),
            batch_delay_ms: defaults::batch_delay_ms(),
            log_window: defaults::log_window(),
            watch_interval_ms: defaults::watch_interval_ms(),
            snapshot_max_age_secs: defaults::snapshot_max_age_secs(),
            cache_capacity: defaults::cache_capacity(),
            rpc_timeout_secs: defaults::rpc_timeout_secs(),
            resolve_timeout_secs: defaults::resolve_timeout_secs(),
            pinning_endpoint: defaults::pinning_endpoint(),
            pinning_gateway: defaults::pinning_gateway(),
            pinning_jwt: String::new(),
            max_file_bytes: defaults::max_file_bytes(),
        }
    }
}

impl Config {
    /// Load from an optional `petvault` config file layered under
    /// `PETVAULT_*` environment variables.
    pub fn load() -> Result<Self, crate::Error> {
        config::Config::builder()
            .add_source(config::File::with_name("petvault").required(false))
            .add_source(config::Environment::with_prefix("PETVAULT"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::Config(format!("failed to load config: {e}")))
    }

    /// Range-check the tunables and parse the contract addresses.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.batch_size == 0 {
            return Err(crate::Error::Config("batch_size must be nonzero".into()));
        }
        if self.fallback_ceiling == 0 {
            return Err(crate::Error::Config("fallback_ceiling must be nonzero".into()));
        }
        if self.log_window == 0 {
            return Err(crate::Error::Config("log_window must be nonzero".into()));
        }
        if self.cache_capacity == 0 {
            return Err(crate::Error::Config("cache_capacity must be nonzero".into()));
        }
        if self.rpc_url.is_empty() {
            return Err(crate::Error::Config("rpc_url must be set".into()));
        }
        parse_address(&self.pet_contract)?;
        if !self.history_contract.is_empty() {
            parse_address(&self.history_contract)?;
        }
        Ok(())
    }
}

mod defaults {
    use crate::resolver::DiscoveryStrategy;

    pub fn rpc_url() -> String {
        "https://testnet-rpc.monad.xyz".into()
    }

    pub fn fallback_rpc_url() -> String {
        rpc_url()
    }

    pub fn chain_id() -> u64 {
        10143
    }

    pub fn pet_contract() -> String {
        "0x4d834963624Cb1A6f2C7FDFF968cAF0d867050a8".into()
    }

    pub fn strategy() -> DiscoveryStrategy {
        DiscoveryStrategy::Auto
    }

    pub fn batch_size() -> usize {
        5
    }

    pub fn fallback_ceiling() -> u64 {
        1000
    }

    pub fn batch_delay_ms() -> u64 {
        100
    }

    pub fn log_window() -> u64 {
        10_000
    }

    pub fn watch_interval_ms() -> u64 {
        4_000
    }

    pub fn snapshot_max_age_secs() -> u64 {
        30
    }

    pub fn cache_capacity() -> usize {
        8
    }

    pub fn rpc_timeout_secs() -> u64 {
        10
    }

    pub fn resolve_timeout_secs() -> u64 {
        60
    }

    pub fn pinning_endpoint() -> String {
        "https://api.pinata.cloud/pinning/pinFileToIPFS".into()
    }

    pub fn pinning_gateway() -> String {
        "https://gateway.pinata.cloud".into()
    }

    pub fn max_file_bytes() -> usize {
        10 * 1024 * 1024
    }
}
