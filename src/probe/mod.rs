//! Lightweight metadata probing for URLs.
//!
//! Before deciding whether to download anything, the processor asks the
//! remote server what lives at a URL: its MIME type, its `ETag` and its size.
//! Probing prefers a `HEAD` request and falls back to a `GET` whose body is
//! never read beyond the first [`SNIFF_LEN`] bytes.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use link_archiver::probe::ContentProber;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let prober = ContentProber::new(Duration::from_secs(10))?;
//! let metadata = prober.probe("https://example.com/report.pdf").await?;
//! println!("{:?} etag={:?}", metadata.mime_type, metadata.etag);
//! # Ok(())
//! # }
//! ```

mod error;
pub mod sniff;

pub use error::ProbeError;
pub use sniff::{SNIFF_LEN, detect_content_type};

use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, HeaderMap};
use reqwest::{Client, Method, Response};
use tracing::{debug, instrument};
use url::Url;

use crate::http_client::{ClientBuildError, build_http_client};

/// Default timeout for a single probe request.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// What a probe learned about a URL. Never persisted on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlMetadata {
    /// MIME type without parameters, when the server (or sniffing) revealed one.
    pub mime_type: Option<String>,
    /// Entity tag with surrounding quotes removed.
    pub etag: Option<String>,
    /// Declared body size from `Content-Length`.
    pub size: Option<u64>,
}

/// Issues `HEAD`/`GET` probes to learn a URL's metadata.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ContentProber {
    client: Client,
}

impl ContentProber {
    /// Creates a prober whose requests are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] when the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, ClientBuildError> {
        Ok(Self {
            client: build_http_client("probe", timeout)?,
        })
    }

    /// Creates a prober around an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Probes `url` for its MIME type, `ETag` and size.
    ///
    /// A `HEAD` request is tried first. On any transport failure or error
    /// status the probe is repeated with `GET`, still only reading headers,
    /// plus the first bytes of the body when `Content-Type` is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when the `GET` fallback fails as well.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn probe(&self, url: &str) -> Result<UrlMetadata, ProbeError> {
        Url::parse(url).map_err(|_| ProbeError::invalid_url(url))?;

        match self.send(Method::HEAD, url).await {
            Ok(response) => return Ok(metadata_from_headers(response.headers())),
            Err(error) => debug!(error = %error, "HEAD probe failed, retrying with GET"),
        }

        let mut response = self.send(Method::GET, url).await?;
        let mut metadata = metadata_from_headers(response.headers());
        if metadata.mime_type.is_none() {
            let prefix = read_prefix(&mut response, SNIFF_LEN).await;
            metadata.mime_type = detect_content_type(&prefix).map(str::to_string);
            debug!(mime_type = ?metadata.mime_type, "sniffed MIME type from body prefix");
        }
        Ok(metadata)
    }

    /// Determines the MIME type of `url`, trying harder than [`probe`](Self::probe).
    ///
    /// Unlike `probe`, a successful `HEAD` without `Content-Type` still falls
    /// through to the `GET` + sniffing pass.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::UndetectedContentType`] when no type could be
    /// determined, or the `GET` request's own error.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn detect_mime_type(&self, url: &str) -> Result<String, ProbeError> {
        Url::parse(url).map_err(|_| ProbeError::invalid_url(url))?;

        match self.send(Method::HEAD, url).await {
            Ok(response) => {
                if let Some(mime_type) = mime_from_headers(response.headers()) {
                    return Ok(mime_type);
                }
                debug!("HEAD response had no Content-Type, retrying with GET");
            }
            Err(error) => debug!(error = %error, "HEAD detection failed, retrying with GET"),
        }

        let mut response = self.send(Method::GET, url).await?;
        if let Some(mime_type) = mime_from_headers(response.headers()) {
            return Ok(mime_type);
        }

        let prefix = read_prefix(&mut response, SNIFF_LEN).await;
        detect_content_type(&prefix)
            .map(str::to_string)
            .ok_or_else(|| ProbeError::undetected(url))
    }

    async fn send(&self, method: Method, url: &str) -> Result<Response, ProbeError> {
        let response = self
            .client
            .request(method, url)
            .send()
            .await
            .map_err(|e| ProbeError::transport(url, e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(ProbeError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

/// Extracts the MIME type portion of a `Content-Type` value.
///
/// Returns `None` for an empty value.
#[must_use]
pub fn mime_essence(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    (!essence.is_empty()).then(|| essence.to_string())
}

/// Strips surrounding double quotes from an `ETag` header value.
#[must_use]
pub fn normalize_etag(raw: &str) -> Option<String> {
    let etag = raw.trim().trim_matches('"');
    (!etag.is_empty()).then(|| etag.to_string())
}

fn mime_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(mime_essence)
}

fn metadata_from_headers(headers: &HeaderMap) -> UrlMetadata {
    UrlMetadata {
        mime_type: mime_from_headers(headers),
        etag: headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .and_then(normalize_etag),
        size: headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok()),
    }
}

/// Reads at most `limit` bytes of the body; read errors end the prefix early.
async fn read_prefix(response: &mut Response, limit: usize) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(limit);
    while prefix.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => prefix.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(error) => {
                debug!(error = %error, "body read failed while sniffing");
                break;
            }
        }
    }
    prefix.truncate(limit);
    prefix
}
