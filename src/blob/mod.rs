// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Content-addressed blob store holding encrypted record payloads.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Largest record payload the gateway client will buffer.
pub const MAX_BLOB_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("Invalid blob reference: {0}")]
    InvalidReference(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Blob exceeds {0} bytes")]
    TooLarge(usize),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, blob_ref: &str) -> Result<Vec<u8>, BlobStoreError>;
}

/// References are restricted to `[A-Za-z0-9._-]` so they cannot escape the
/// gateway path.
pub fn validate_blob_ref(blob_ref: &str) -> Result<(), BlobStoreError> {
    let valid = !blob_ref.is_empty()
        && blob_ref.len() <= 256
        && !blob_ref.starts_with('.')
        && blob_ref
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(BlobStoreError::InvalidReference(blob_ref.to_string()))
    }
}

/// IPFS-style HTTP gateway: `GET {base}/ipfs/{ref}`.
pub struct GatewayBlobStore {
    client: reqwest::Client,
    base_url: url::Url,
    max_bytes: usize,
}

impl GatewayBlobStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BlobStoreError> {
        let base_url = url::Url::parse(base_url)
            .map_err(|e| BlobStoreError::Gateway(format!("invalid gateway url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BlobStoreError::Gateway(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            max_bytes: MAX_BLOB_BYTES,
        })
    }

    #[cfg(test)]
    fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn blob_url(&self, blob_ref: &str) -> Result<url::Url, BlobStoreError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        url::Url::parse(&format!("{base}/ipfs/{blob_ref}"))
            .map_err(|e| BlobStoreError::Gateway(e.to_string()))
    }
}

#[async_trait]
impl BlobStore for GatewayBlobStore {
    async fn fetch(&self, blob_ref: &str) -> Result<Vec<u8>, BlobStoreError> {
        validate_blob_ref(blob_ref)?;
        let url = self.blob_url(blob_ref)?;
        debug!(%url, "Fetching blob");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BlobStoreError::Gateway(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobStoreError::NotFound(blob_ref.to_string()));
        }
        if !response.status().is_success() {
            return Err(BlobStoreError::Gateway(format!(
                "gateway returned {}",
                response.status()
            )));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                warn!(blob_ref, length, limit = self.max_bytes, "Blob larger than limit");
                return Err(BlobStoreError::TooLarge(self.max_bytes));
            }
        }

        // Content-Length may be absent or wrong, so the body is capped as it
        // streams in.
        let mut response = response;
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| BlobStoreError::Gateway(e.to_string()))?
        {
            append_capped(&mut body, &chunk, self.max_bytes)?;
        }
        Ok(body)
    }
}

fn append_capped(body: &mut Vec<u8>, chunk: &[u8], max_bytes: usize) -> Result<(), BlobStoreError> {
    if body.len().saturating_add(chunk.len()) > max_bytes {
        return Err(BlobStoreError::TooLarge(max_bytes));
    }
    body.extend_from_slice(chunk);
    Ok(())
}
