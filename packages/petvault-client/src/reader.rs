//! Typed read access to the pet and history contracts over JSON-RPC.

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use petvault_types::{HistoryItem, TokenId, TransferEvent};
use serde_json::{json, Value};

use crate::contract::{IPetHistoryNFT, IPetNFT, TRANSFER_TOPIC};
use crate::error::Error;
use crate::rpc::{decode_hex_str, format_quantity, parse_quantity_str, EvmRpcClient, RawLog};

/// Topic constraint for transfer-log queries. `None` on both sides matches
/// every Transfer the contract emits.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferFilter {
    pub from: Option<Address>,
    pub to: Option<Address>,
}

/// Read capability over the pet contract.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn balance_of(&self, owner: Address) -> Result<U256, Error>;

    /// Fails with [`Error::Unsupported`] when the contract lacks the call.
    async fn total_supply(&self) -> Result<U256, Error>;

    /// Fails with [`Error::TokenNotFound`] for ids that do not exist.
    async fn owner_of(&self, token_id: TokenId) -> Result<Address, Error>;

    async fn token_uri(&self, token_id: TokenId) -> Result<String, Error>;

    async fn block_number(&self) -> Result<u64, Error>;

    /// Transfer events in `[from_block, to_block]`, both bounds inclusive.
    async fn transfer_logs(
        &self,
        from_block: u64,
        to_block: u64,
        filter: TransferFilter,
    ) -> Result<Vec<TransferEvent>, Error>;
}

/// Read capability over the history contract.
#[async_trait]
pub trait HistoryReader: Send + Sync {
    async fn nested_items(
        &self,
        parent_contract: Address,
        parent_token_id: TokenId,
    ) -> Result<Vec<TokenId>, Error>;

    async fn history_item(&self, token_id: TokenId) -> Result<HistoryItem, Error>;

    async fn is_nested(&self, token_id: TokenId) -> Result<bool, Error>;
}

/// Production [`ChainReader`] over [`EvmRpcClient`].
pub struct RpcChainReader {
    rpc: Arc<EvmRpcClient>,
    contract: Address,
}

impl RpcChainReader {
    pub fn new(rpc: Arc<EvmRpcClient>, contract: Address) -> Self {
        Self { rpc, contract }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn balance_of(&self, owner: Address) -> Result<U256, Error> {
        let data = IPetNFT::balanceOfCall { owner }.abi_encode();
        let out = self.rpc.call(self.contract, &data).await?;
        let ret = IPetNFT::balanceOfCall::abi_decode_returns(&out, true)
            .map_err(|e| Error::Abi(format!("balanceOf return: {e}")))?;
        Ok(ret.balance)
    }

    async fn total_supply(&self) -> Result<U256, Error> {
        let data = IPetNFT::totalSupplyCall {}.abi_encode();
        let out = match self.rpc.call(self.contract, &data).await {
            Ok(out) => out,
            Err(Error::Reverted(_)) => return Err(Error::Unsupported("totalSupply")),
            Err(e) => return Err(e),
        };
        // Some nodes answer a missing selector with empty data instead of a
        // revert.
        if out.is_empty() {
            return Err(Error::Unsupported("totalSupply"));
        }
        let ret = IPetNFT::totalSupplyCall::abi_decode_returns(&out, true)
            .map_err(|e| Error::Abi(format!("totalSupply return: {e}")))?;
        Ok(ret.supply)
    }

    async fn owner_of(&self, token_id: TokenId) -> Result<Address, Error> {
        let data = IPetNFT::ownerOfCall { tokenId: token_id }.abi_encode();
        let out = match self.rpc.call(self.contract, &data).await {
            Ok(out) => out,
            Err(Error::Reverted(_)) => return Err(Error::TokenNotFound(token_id)),
            Err(e) => return Err(e),
        };
        let ret = IPetNFT::ownerOfCall::abi_decode_returns(&out, true)
            .map_err(|e| Error::Abi(format!("ownerOf return: {e}")))?;
        Ok(ret.owner)
    }

    async fn token_uri(&self, token_id: TokenId) -> Result<String, Error> {
        let data = IPetNFT::tokenURICall { tokenId: token_id }.abi_encode();
        let out = match self.rpc.call(self.contract, &data).await {
            Ok(out) => out,
            Err(Error::Reverted(_)) => return Err(Error::TokenNotFound(token_id)),
            Err(e) => return Err(e),
        };
        let ret = IPetNFT::tokenURICall::abi_decode_returns(&out, true)
            .map_err(|e| Error::Abi(format!("tokenURI return: {e}")))?;
        Ok(ret.uri)
    }

    async fn block_number(&self) -> Result<u64, Error> {
        self.rpc.block_number().await
    }

    async fn transfer_logs(
        &self,
        from_block: u64,
        to_block: u64,
        filter: TransferFilter,
    ) -> Result<Vec<TransferEvent>, Error> {
        let mut topics = vec![json!(TRANSFER_TOPIC.to_string())];
        if filter.from.is_some() || filter.to.is_some() {
            topics.push(topic_or_null(filter.from));
        }
        if filter.to.is_some() {
            topics.push(topic_or_null(filter.to));
        }
        let filter_obj = json!({
            "address": self.contract.to_string(),
            "fromBlock": format_quantity(from_block),
            "toBlock": format_quantity(to_block),
            "topics": topics,
        });
        let raw = self.rpc.get_logs(filter_obj).await?;
        raw.iter().map(decode_transfer).collect()
    }
}

/// Production [`HistoryReader`] over [`EvmRpcClient`].
pub struct RpcHistoryReader {
    rpc: Arc<EvmRpcClient>,
    contract: Address,
}

impl RpcHistoryReader {
    pub fn new(rpc: Arc<EvmRpcClient>, contract: Address) -> Self {
        Self { rpc, contract }
    }
}

#[async_trait]
impl HistoryReader for RpcHistoryReader {
    async fn nested_items(
        &self,
        parent_contract: Address,
        parent_token_id: TokenId,
    ) -> Result<Vec<TokenId>, Error> {
        let data = IPetHistoryNFT::getNestedItemsCall {
            parentContract: parent_contract,
            parentTokenId: parent_token_id,
        }
        .abi_encode();
        let out = self.rpc.call(self.contract, &data).await?;
        let ret = IPetHistoryNFT::getNestedItemsCall::abi_decode_returns(&out, true)
            .map_err(|e| Error::Abi(format!("getNestedItems return: {e}")))?;
        Ok(ret.tokenIds)
    }

    async fn history_item(&self, token_id: TokenId) -> Result<HistoryItem, Error> {
        let data = IPetHistoryNFT::getHistoryItemCall { tokenId: token_id }.abi_encode();
        let out = match self.rpc.call(self.contract, &data).await {
            Ok(out) => out,
            Err(Error::Reverted(_)) => return Err(Error::TokenNotFound(token_id)),
            Err(e) => return Err(e),
        };
        let ret = IPetHistoryNFT::getHistoryItemCall::abi_decode_returns(&out, true)
            .map_err(|e| Error::Abi(format!("getHistoryItem return: {e}")))?;
        Ok(HistoryItem {
            title: ret.title,
            description: ret.description,
            file_uri: ret.fileURI,
            file_type: ret.fileType,
            timestamp: u64::try_from(ret.timestamp).unwrap_or(u64::MAX),
            parent_contract: ret.parentContract,
            parent_token_id: ret.parentTokenId,
        })
    }

    async fn is_nested(&self, token_id: TokenId) -> Result<bool, Error> {
        let data = IPetHistoryNFT::isNestedCall { tokenId: token_id }.abi_encode();
        let out = self.rpc.call(self.contract, &data).await?;
        let ret = IPetHistoryNFT::isNestedCall::abi_decode_returns(&out, true)
            .map_err(|e| Error::Abi(format!("isNested return: {e}")))?;
        Ok(ret.nested)
    }
}

// --- Log decoding ---

/// Decode one raw Transfer log. All three parameters are indexed, so both
/// addresses and the token id live in the topics and the data is empty.
fn decode_transfer(log: &RawLog) -> Result<TransferEvent, Error> {
    if log.topics.len() != 4 {
        return Err(Error::Abi(format!(
            "transfer log with {} topics",
            log.topics.len()
        )));
    }
    Ok(TransferEvent {
        from: topic_address(&log.topics[1])?,
        to: topic_address(&log.topics[2])?,
        token_id: topic_u256(&log.topics[3])?,
        block_number: parse_quantity_str(&log.block_number)?,
        log_index: parse_quantity_str(&log.log_index)?,
    })
}

fn topic_bytes(topic: &str) -> Result<[u8; 32], Error> {
    let bytes = decode_hex_str(topic)?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| Error::Abi(format!("topic is {} bytes, expected 32", bytes.len())))
}

fn topic_address(topic: &str) -> Result<Address, Error> {
    let bytes = topic_bytes(topic)?;
    Ok(Address::from_slice(&bytes[12..32]))
}

fn topic_u256(topic: &str) -> Result<U256, Error> {
    Ok(U256::from_be_slice(&topic_bytes(topic)?))
}

/// Left-pad an address into a 32-byte log topic.
fn address_topic(addr: Address) -> B256 {
    let mut topic = B256::ZERO;
    topic.0[12..].copy_from_slice(addr.as_slice());
    topic
}

fn topic_or_null(addr: Option<Address>) -> Value {
    match addr {
        Some(a) => json!(address_topic(a).to_string()),
        None => Value::Null,
    }
}
