//! Uploads pet images and history documents to an IPFS pinning service.

use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Content types the service accepts: images for pet portraits, images or
/// PDFs for history documents. Everything else is rejected before any bytes
/// leave the process.
const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
];

/// Coarse classification recorded on history items alongside the file URI.
pub fn classify_file_type(content_type: &str) -> &'static str {
    if content_type.starts_with("image/") {
        "image"
    } else {
        "document"
    }
}

/// A successfully pinned file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedFile {
    /// Content hash returned by the service.
    pub hash: String,
    /// Browsable URL on the configured gateway.
    pub gateway_url: String,
}

#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Client for the pinning service's file-upload endpoint.
pub struct PinningClient {
    http: reqwest::Client,
    endpoint: String,
    gateway: String,
    jwt: String,
    max_file_bytes: usize,
}

impl PinningClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("pinning HTTP client build failed: {e}")))?;
        Ok(Self {
            http,
            endpoint: config.pinning_endpoint.clone(),
            gateway: config.pinning_gateway.clone(),
            jwt: config.pinning_jwt.clone(),
            max_file_bytes: config.max_file_bytes,
        })
    }

    /// Upload one file and return its content hash plus a gateway URL.
    ///
    /// Size and content-type limits are enforced locally first; an invalid
    /// file never produces network traffic.
    pub async fn pin_file(
        &self,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<PinnedFile, Error> {
        self.validate(content_type, bytes.len())?;
        let size = bytes.len();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str(content_type)
            .map_err(|e| Error::Pinning(format!("invalid content type {content_type:?}: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.jwt)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Pinning(format!("upload failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Pinata nests the useful message under error.details.
            let details = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/details")
                        .and_then(|d| d.as_str())
                        .map(str::to_string)
                })
                .unwrap_or(body);
            warn!(status = %status, "Pinning upload rejected");
            return Err(Error::Pinning(format!("service returned {status}: {details}")));
        }
        let parsed: PinResponse = response
            .json()
            .await
            .map_err(|e| Error::Pinning(format!("malformed pin response: {e}")))?;
        let gateway_url = gateway_url(&self.gateway, &parsed.ipfs_hash);
        info!(hash = %parsed.ipfs_hash, size, "File pinned");
        Ok(PinnedFile {
            hash: parsed.ipfs_hash,
            gateway_url,
        })
    }

    fn validate(&self, content_type: &str, size: usize) -> Result<(), Error> {
        if self.jwt.is_empty() {
            return Err(Error::Config("pinning_jwt not configured".into()));
        }
        if size == 0 {
            return Err(Error::Pinning("file is empty".into()));
        }
        if size > self.max_file_bytes {
            return Err(Error::Pinning(format!(
                "file is {size} bytes, limit is {}",
                self.max_file_bytes
            )));
        }
        if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
            return Err(Error::Pinning(format!(
                "unsupported content type {content_type:?}, expected an image or PDF"
            )));
        }
        Ok(())
    }
}

fn gateway_url(gateway: &str, hash: &str) -> String {
    format!("{}/ipfs/{hash}", gateway.trim_end_matches('/'))
}
