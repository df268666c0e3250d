//! Raw byte download of a URL's response body.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use tracing::{debug, instrument};
use url::Url;

use super::filename::download_filename;
use super::{ArchivalTool, ArchiveError, ArchivedFile};
use crate::http_client::{ClientBuildError, build_http_client};
use crate::probe::mime_essence;

/// Default whole-request timeout for direct downloads.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Default ceiling on a downloaded body (100 MiB).
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Keeps the response body exactly as served.
#[derive(Debug, Clone)]
pub struct DirectDownload {
    client: Client,
    max_bytes: u64,
}

impl DirectDownload {
    /// Tool name referenced by rules.
    pub const NAME: &'static str = "direct_download";

    /// Creates the tool with its own client bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] when the HTTP client cannot be built.
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self, ClientBuildError> {
        Ok(Self {
            client: build_http_client(Self::NAME, timeout)?,
            max_bytes,
        })
    }

    /// The size ceiling in bytes.
    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

#[async_trait]
impl ArchivalTool for DirectDownload {
    fn name(&self) -> &str {
        Self::NAME
    }

    #[instrument(skip(self), fields(url = %url, tool = "direct_download"))]
    async fn archive(&self, url: &str, mime_type: &str) -> Result<ArchivedFile, ArchiveError> {
        let parsed = Url::parse(url).map_err(|_| ArchiveError::invalid_url(url))?;

        let response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| ArchiveError::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::http_status(url, status.as_u16()));
        }

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(declared) = declared
            && declared > self.max_bytes
        {
            return Err(ArchiveError::too_large(url, declared, self.max_bytes));
        }

        let filename = download_filename(
            response
                .headers()
                .get(CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok()),
            &parsed,
        );
        let resolved_mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(mime_essence)
            .unwrap_or_else(|| mime_type.to_string());

        let bytes = read_capped(response, url, self.max_bytes).await?;
        debug!(
            filename = %filename,
            mime_type = %resolved_mime,
            bytes = bytes.len(),
            "direct download complete"
        );

        Ok(ArchivedFile::new(filename, bytes, resolved_mime))
    }
}

/// Reads the body, failing once more than `limit` bytes have arrived.
pub(super) async fn read_capped(
    response: reqwest::Response,
    url: &str,
    limit: u64,
) -> Result<Vec<u8>, ArchiveError> {
    let mut stream = response.bytes_stream();
    let mut body = Vec::new();
    let mut received: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| ArchiveError::transport(url, e))?;
        received += chunk.len() as u64;
        if received > limit {
            return Err(ArchiveError::too_large(url, received, limit));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}
