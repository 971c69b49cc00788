//! Token metadata decoding from self-contained data URIs.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use serde::Deserialize;

use crate::error::MetadataError;

/// One `{trait_type, value}` entry from the metadata `attributes` array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetadataAttribute {
    pub trait_type: String,
    pub value: String,
}

/// JSON payload carried by an ERC-721 `tokenURI`.
///
/// Contracts that build metadata on-chain sometimes omit fields; everything
/// defaults to empty rather than failing the decode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub attributes: Vec<MetadataAttribute>,
}

impl TokenMetadata {
    /// Look up an attribute value by trait type.
    pub fn attribute(&self, trait_type: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.trait_type == trait_type)
            .map(|a| a.value.as_str())
    }
}

/// Decode a `data:application/json;base64,<payload>` URI.
///
/// Splits at the first comma and base64-decodes the remainder; the header
/// before the comma must declare base64 encoding.
pub fn decode_token_uri(uri: &str) -> Result<TokenMetadata, MetadataError> {
    let (header, payload) = uri.split_once(',').ok_or(MetadataError::NotDataUri)?;
    if !header.starts_with("data:") || !header.contains("base64") {
        return Err(MetadataError::NotDataUri);
    }
    let decoded = B64
        .decode(payload.trim())
        .map_err(|e| MetadataError::Base64(e.to_string()))?;
    serde_json::from_slice(&decoded).map_err(|e| MetadataError::Json(e.to_string()))
}
