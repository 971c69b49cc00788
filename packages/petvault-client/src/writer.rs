//! Injected chain-write capability and calldata builders.

use alloy_primitives::{Address, B256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use petvault_types::TokenId;

use crate::contract::{IPetHistoryNFT, IPetNFT};
use crate::error::Error;

/// The narrow write seam of the library.
///
/// PetVault never holds key material. The embedding application implements
/// this trait over whatever it signs with (a wallet bridge, a relayer, a
/// pre-signed-transaction submitter) and injects it; test harnesses implement
/// it in-process.
#[async_trait]
pub trait ChainWriter: Send + Sync {
    /// Submit a transaction invoking `calldata` against `to`. Resolves to the
    /// transaction hash once the node has accepted the transaction.
    async fn submit(&self, to: Address, calldata: Vec<u8>) -> Result<B256, Error>;
}

/// Calldata for `safeMint(to, petName, petOwner, petBirth, imageURI)`.
pub fn mint_pet_calldata(
    to: Address,
    pet_name: &str,
    pet_owner: &str,
    pet_birth: &str,
    image_uri: &str,
) -> Vec<u8> {
    IPetNFT::safeMintCall {
        to,
        petName: pet_name.to_string(),
        petOwner: pet_owner.to_string(),
        petBirth: pet_birth.to_string(),
        imageURI: image_uri.to_string(),
    }
    .abi_encode()
}

/// Calldata for `mintHistoryItem(to, title, description, fileURI, fileType,
/// parentContract, parentTokenId)`. The new record nests under the parent pet
/// token named by the last two arguments.
#[allow(clippy::too_many_arguments)]
pub fn mint_history_item_calldata(
    to: Address,
    title: &str,
    description: &str,
    file_uri: &str,
    file_type: &str,
    parent_contract: Address,
    parent_token_id: TokenId,
) -> Vec<u8> {
    IPetHistoryNFT::mintHistoryItemCall {
        to,
        title: title.to_string(),
        description: description.to_string(),
        fileURI: file_uri.to_string(),
        fileType: file_type.to_string(),
        parentContract: parent_contract,
        parentTokenId: parent_token_id,
    }
    .abi_encode()
}
