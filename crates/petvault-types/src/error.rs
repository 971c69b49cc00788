/// Failure decoding a token-URI metadata payload.
#[derive(Debug, Clone)]
pub enum MetadataError {
    /// The URI is not a base64 JSON data URI.
    NotDataUri,
    Base64(String),
    Json(String),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotDataUri => write!(f, "not a base64 JSON data URI"),
            Self::Base64(msg) => write!(f, "invalid base64 payload: {msg}"),
            Self::Json(msg) => write!(f, "invalid metadata JSON: {msg}"),
        }
    }
}

impl std::error::Error for MetadataError {}

/// Malformed chain address string.
#[derive(Debug, Clone)]
pub struct InvalidAddress(pub String);

impl std::fmt::Display for InvalidAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid address: {:?}", self.0)
    }
}

impl std::error::Error for InvalidAddress {}
