//! Error types for the PetVault client.

use std::fmt;

use petvault_types::TokenId;

/// Client error type.
///
/// Per-candidate outcomes (`TokenNotFound`) are absorbed inside the resolver;
/// only whole-operation failures reach the embedding application, and a
/// failure never disturbs a previously cached snapshot.
#[derive(Debug)]
pub enum Error {
    /// Configuration error, including unconfigured optional capabilities.
    Config(String),
    /// Transport or JSON-RPC failure. Retry-eligible.
    Rpc(String),
    /// `eth_call` execution revert (missing selector or state rejection).
    Reverted(String),
    /// The token does not exist: `ownerOf` reverted for this id.
    TokenNotFound(TokenId),
    /// The contract does not expose an optional capability.
    Unsupported(&'static str),
    /// Returned call data could not be decoded.
    Abi(String),
    /// Whole-resolution failure surfaced to the embedding UI.
    Resolution(String),
    /// In-flight result discarded because the observed owner changed.
    Superseded,
    /// Token metadata could not be decoded.
    Metadata(String),
    /// Pinning upload rejected or failed.
    Pinning(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Rpc(msg) => write!(f, "rpc error: {msg}"),
            Error::Reverted(msg) => write!(f, "execution reverted: {msg}"),
            Error::TokenNotFound(id) => write!(f, "token {id} does not exist"),
            Error::Unsupported(what) => write!(f, "contract does not support {what}"),
            Error::Abi(msg) => write!(f, "abi error: {msg}"),
            Error::Resolution(msg) => write!(f, "resolution failed: {msg}"),
            Error::Superseded => write!(f, "resolution superseded by owner change"),
            Error::Metadata(msg) => write!(f, "metadata error: {msg}"),
            Error::Pinning(msg) => write!(f, "pinning error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<petvault_types::MetadataError> for Error {
    fn from(e: petvault_types::MetadataError) -> Self {
        Error::Metadata(e.to_string())
    }
}

impl From<petvault_types::InvalidAddress> for Error {
    fn from(e: petvault_types::InvalidAddress) -> Self {
        Error::Config(e.to_string())
    }
}
