//! The PetVault facade: one connected session over the pet and history
//! contracts, the pinning service, and the background refresh machinery.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use futures::future::join_all;
use petvault_types::{
    decode_token_uri, parse_address, HistoryItem, OwnershipSnapshot, TokenId, TokenMetadata,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::SnapshotCache;
use crate::config::Config;
use crate::error::Error;
use crate::pinning::{PinnedFile, PinningClient};
use crate::reader::{ChainReader, HistoryReader, RpcChainReader, RpcHistoryReader};
use crate::resolver::{OwnershipResolver, ResolverSettings};
use crate::rpc::EvmRpcClient;
use crate::tracker::{OwnershipTracker, RefreshSignal, TrackerStats};
use crate::watcher::{TransferWatcher, WatcherSettings};
use crate::writer::{mint_history_item_calldata, mint_pet_calldata, ChainWriter};

/// Buffered refresh signals; producers drop on overflow since queued signals
/// already imply a refresh is coming.
const SIGNAL_BUFFER: usize = 16;

/// Fields for minting a new pet token to the session owner.
#[derive(Debug, Clone)]
pub struct MintPetRequest {
    pub name: String,
    pub owner_name: String,
    pub birth_date: String,
    pub image_uri: String,
}

/// Fields for minting a history record under an owned pet.
#[derive(Debug, Clone)]
pub struct NewHistoryItem {
    pub title: String,
    pub description: String,
    pub file_uri: String,
    /// `"image"` or `"document"`, see [`crate::pinning::classify_file_type`].
    pub file_type: String,
}

/// A pet token with its decoded on-chain metadata.
#[derive(Debug, Clone)]
pub struct PetRecord {
    pub token_id: TokenId,
    pub metadata: TokenMetadata,
}

/// Handles for the spawned background loops. Cancel their token, then
/// [`join`](BackgroundTasks::join) to wait for a clean exit.
pub struct BackgroundTasks {
    pub watcher: JoinHandle<()>,
    pub refresher: JoinHandle<()>,
    /// Producer side of the refresh channel. The embedding application can
    /// push [`RefreshSignal::Manual`] here for a non-blocking refresh.
    pub signals: mpsc::Sender<RefreshSignal>,
}

impl BackgroundTasks {
    pub async fn join(self) {
        let _ = self.watcher.await;
        let _ = self.refresher.await;
    }
}

/// A connected PetVault session.
///
/// Reads go through injected [`ChainReader`]/[`HistoryReader`] capabilities,
/// writes through an optional injected [`ChainWriter`]; the library itself
/// holds no key material. Ownership state for the session owner lives in the
/// embedded [`OwnershipTracker`].
pub struct PetVault {
    config: Config,
    rpc: Option<Arc<EvmRpcClient>>,
    reader: Arc<dyn ChainReader>,
    history: Option<Arc<dyn HistoryReader>>,
    writer: Option<Arc<dyn ChainWriter>>,
    pinning: PinningClient,
    tracker: Arc<OwnershipTracker>,
    pet_contract: Address,
    history_contract: Option<Address>,
    max_age: Duration,
}

impl PetVault {
    /// Connect over JSON-RPC and verify the node serves the configured
    /// chain. Writes stay disabled until a [`ChainWriter`] is attached with
    /// [`with_writer`](PetVault::with_writer).
    pub async fn connect(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let rpc = Arc::new(EvmRpcClient::new(
            &config.rpc_url,
            &config.fallback_rpc_url,
            Duration::from_secs(config.rpc_timeout_secs),
        )?);
        let reported = rpc.chain_id().await?;
        if reported != config.chain_id {
            return Err(Error::Config(format!(
                "connected to chain {reported}, expected {}",
                config.chain_id
            )));
        }
        let pet_contract = parse_address(&config.pet_contract)?;
        let reader: Arc<dyn ChainReader> =
            Arc::new(RpcChainReader::new(Arc::clone(&rpc), pet_contract));
        let history: Option<Arc<dyn HistoryReader>> = if config.history_contract.is_empty() {
            None
        } else {
            let contract = parse_address(&config.history_contract)?;
            Some(Arc::new(RpcHistoryReader::new(Arc::clone(&rpc), contract)))
        };
        info!(
            chain_id = reported,
            contract = %pet_contract,
            "Connected to pet vault"
        );
        Self::assemble(config, Some(rpc), reader, history, None)
    }

    /// Assemble a vault from already-built capabilities. This is the seam
    /// for custom transports and test doubles; [`connect`](PetVault::connect)
    /// is the production path.
    pub fn from_parts(
        config: Config,
        reader: Arc<dyn ChainReader>,
        history: Option<Arc<dyn HistoryReader>>,
        writer: Option<Arc<dyn ChainWriter>>,
    ) -> Result<Self, Error> {
        config.validate()?;
        Self::assemble(config, None, reader, history, writer)
    }

    fn assemble(
        config: Config,
        rpc: Option<Arc<EvmRpcClient>>,
        reader: Arc<dyn ChainReader>,
        history: Option<Arc<dyn HistoryReader>>,
        writer: Option<Arc<dyn ChainWriter>>,
    ) -> Result<Self, Error> {
        let pet_contract = parse_address(&config.pet_contract)?;
        let history_contract = if config.history_contract.is_empty() {
            None
        } else {
            Some(parse_address(&config.history_contract)?)
        };
        let resolver =
            OwnershipResolver::new(Arc::clone(&reader), ResolverSettings::from_config(&config));
        let cache = Arc::new(SnapshotCache::new(config.cache_capacity));
        let tracker = Arc::new(OwnershipTracker::new(resolver, cache));
        let pinning = PinningClient::new(&config)?;
        let max_age = Duration::from_secs(config.snapshot_max_age_secs);
        Ok(Self {
            config,
            rpc,
            reader,
            history,
            writer,
            pinning,
            tracker,
            pet_contract,
            history_contract,
            max_age,
        })
    }

    /// Attach the write capability. Consumes and returns the vault so it
    /// composes with `connect(...).await?.with_writer(...)`.
    pub fn with_writer(mut self, writer: Arc<dyn ChainWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    // ── Session ────────────────────────────────────────────────────────────

    /// Switch the observed owner. `None` ends the session; the previous
    /// owner's cached snapshot is dropped either way.
    pub fn set_owner(&self, owner: Option<Address>) {
        self.tracker.set_owner(owner);
    }

    pub fn owner(&self) -> Option<Address> {
        self.tracker.owner()
    }

    pub fn tracker(&self) -> &Arc<OwnershipTracker> {
        &self.tracker
    }

    pub fn stats(&self) -> TrackerStats {
        self.tracker.stats()
    }

    // ── Ownership ──────────────────────────────────────────────────────────

    /// Owned tokens for the session owner, from cache when fresh.
    pub async fn owned_tokens(&self) -> Result<OwnershipSnapshot, Error> {
        self.tracker.snapshot(self.max_age).await
    }

    /// Force a fresh resolution for the session owner.
    pub async fn refresh(&self) -> Result<OwnershipSnapshot, Error> {
        self.tracker.refresh().await
    }

    /// Last resolved snapshot without touching the chain.
    pub fn cached(&self) -> Option<OwnershipSnapshot> {
        self.tracker.cached()
    }

    // ── Pets ───────────────────────────────────────────────────────────────

    /// Fetch and decode one pet's metadata.
    pub async fn pet(&self, token_id: TokenId) -> Result<PetRecord, Error> {
        let uri = self.reader.token_uri(token_id).await?;
        let metadata = decode_token_uri(&uri)?;
        Ok(PetRecord { token_id, metadata })
    }

    /// Mint a new pet to the session owner. Requires an attached writer.
    pub async fn mint_pet(&self, request: MintPetRequest) -> Result<B256, Error> {
        let writer = self.require_writer()?;
        let to = self.require_owner()?;
        let calldata = mint_pet_calldata(
            to,
            &request.name,
            &request.owner_name,
            &request.birth_date,
            &request.image_uri,
        );
        let tx = writer.submit(self.pet_contract, calldata).await?;
        info!(tx = %tx, name = %request.name, "Submitted pet mint");
        Ok(tx)
    }

    // ── History ────────────────────────────────────────────────────────────

    /// All history records nested under a pet, in the order the contract
    /// reports them.
    pub async fn history(&self, token_id: TokenId) -> Result<Vec<HistoryItem>, Error> {
        let history = self.require_history()?;
        let ids = history.nested_items(self.pet_contract, token_id).await?;
        let fetches = ids.iter().map(|id| history.history_item(*id));
        join_all(fetches).await.into_iter().collect()
    }

    /// Whether a history token is nested under some parent.
    pub async fn is_nested(&self, token_id: TokenId) -> Result<bool, Error> {
        self.require_history()?.is_nested(token_id).await
    }

    /// Mint a history record nested under `parent_token_id` of the pet
    /// contract. Requires the history contract and an attached writer.
    pub async fn add_history_item(
        &self,
        parent_token_id: TokenId,
        item: NewHistoryItem,
    ) -> Result<B256, Error> {
        let contract = self
            .history_contract
            .ok_or_else(|| Error::Config("history_contract not configured".into()))?;
        let writer = self.require_writer()?;
        let to = self.require_owner()?;
        let calldata = mint_history_item_calldata(
            to,
            &item.title,
            &item.description,
            &item.file_uri,
            &item.file_type,
            self.pet_contract,
            parent_token_id,
        );
        let tx = writer.submit(contract, calldata).await?;
        info!(
            tx = %tx,
            parent = %parent_token_id,
            title = %item.title,
            "Submitted history item mint"
        );
        Ok(tx)
    }

    // ── Files ──────────────────────────────────────────────────────────────

    /// Pin a file to IPFS for use as a pet image or history document.
    pub async fn pin_file(
        &self,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<PinnedFile, Error> {
        self.pinning.pin_file(name, content_type, bytes).await
    }

    // ── Background ─────────────────────────────────────────────────────────

    /// Spawn the transfer watcher and the refresh loop it feeds. Cancel the
    /// token to stop both.
    pub fn spawn_background(&self, cancel: CancellationToken) -> BackgroundTasks {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
        let watcher = Arc::new(TransferWatcher::new(
            Arc::clone(&self.reader),
            Arc::clone(&self.tracker),
            signal_tx.clone(),
            WatcherSettings {
                interval: Duration::from_millis(self.config.watch_interval_ms),
                ..WatcherSettings::default()
            },
        ));
        let watcher_cancel = cancel.clone();
        let watcher_task = tokio::spawn(async move {
            watcher.run(watcher_cancel).await;
        });
        let tracker = Arc::clone(&self.tracker);
        let refresher_task = tokio::spawn(async move {
            tracker.run_signal_loop(signal_rx, cancel).await;
        });
        info!("Background transfer watching started");
        BackgroundTasks {
            watcher: watcher_task,
            refresher: refresher_task,
            signals: signal_tx,
        }
    }

    /// Probe RPC connectivity: `"ok"` when the primary answers, `"degraded"`
    /// when only the fallback does.
    pub async fn health_check(&self) -> Result<&'static str, Error> {
        match &self.rpc {
            Some(rpc) => rpc.health_check().await,
            None => Err(Error::Config("no RPC transport attached".into())),
        }
    }

    fn require_writer(&self) -> Result<&Arc<dyn ChainWriter>, Error> {
        self.writer
            .as_ref()
            .ok_or_else(|| Error::Config("no chain writer attached".into()))
    }

    fn require_history(&self) -> Result<&Arc<dyn HistoryReader>, Error> {
        self.history
            .as_ref()
            .ok_or_else(|| Error::Config("history_contract not configured".into()))
    }

    fn require_owner(&self) -> Result<Address, Error> {
        self.tracker
            .owner()
            .ok_or_else(|| Error::Config("no session owner set".into()))
    }
}
