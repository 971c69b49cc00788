//! ABI bindings for the pet and history contracts.

use alloy_primitives::B256;
use alloy_sol_types::{sol, SolEvent};

sol! {
    /// ERC-721 surface of the pet contract, plus its mint entry point.
    #[derive(Debug)]
    interface IPetNFT {
        /// Emitted on every ownership change, including mints (from the
        /// zero address) and burns (to the zero address).
        event Transfer(
            address indexed from,
            address indexed to,
            uint256 indexed tokenId
        );

        function balanceOf(address owner) external view returns (uint256 balance);

        function totalSupply() external view returns (uint256 supply);

        /// Reverts for token ids that were never minted (or were burned).
        function ownerOf(uint256 tokenId) external view returns (address owner);

        /// Returns a self-contained base64 JSON data URI.
        function tokenURI(uint256 tokenId) external view returns (string uri);

        function safeMint(
            address to,
            string petName,
            string petOwner,
            string petBirth,
            string imageURI
        ) external;
    }

    /// History contract: records minted as NFTs nested under a pet token.
    #[derive(Debug)]
    interface IPetHistoryNFT {
        function mintHistoryItem(
            address to,
            string title,
            string description,
            string fileURI,
            string fileType,
            address parentContract,
            uint256 parentTokenId
        ) external;

        function getNestedItems(
            address parentContract,
            uint256 parentTokenId
        ) external view returns (uint256[] tokenIds);

        function getHistoryItem(uint256 tokenId) external view returns (
            string title,
            string description,
            string fileURI,
            string fileType,
            uint256 timestamp,
            address parentContract,
            uint256 parentTokenId
        );

        function isNested(uint256 tokenId) external view returns (bool nested);
    }
}

/// keccak256("Transfer(address,address,uint256)"), topic 0 of every
/// ownership change.
pub const TRANSFER_TOPIC: B256 = IPetNFT::Transfer::SIGNATURE_HASH;
