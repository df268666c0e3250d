//! Single-file HTML snapshots.
//!
//! The page is fetched, its sub-resources (stylesheets, scripts, images,
//! media, icons) are fetched alongside, and every reference that could be
//! retrieved is rewritten into a base64 `data:` URI. The result opens offline
//! in any browser.
//!
//! Rewriting works on the raw page bytes, so pages in any ASCII-compatible
//! encoding keep their text as served. The page plus every inlined resource
//! share one byte budget.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures_util::{StreamExt, stream};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use super::direct::read_capped;
use super::filename::snapshot_filename;
use super::{ArchivalTool, ArchiveError, ArchivedFile};
use crate::http_client::{ClientBuildError, build_http_client};
use crate::probe::{detect_content_type, mime_essence};

/// Default timeout for a whole snapshot, sub-resources included.
pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default ceiling on the produced document (50 MiB).
pub const DEFAULT_MAX_SNAPSHOT_BYTES: u64 = 50 * 1024 * 1024;

/// Sub-resources fetched at the same time.
const MAX_CONCURRENT_RESOURCES: usize = 5;

/// Elements whose attribute points at an inlinable sub-resource.
const RESOURCE_SELECTORS: &[(&str, &str)] = &[
    (r#"link[rel~="stylesheet"][href]"#, "href"),
    (r#"link[rel~="icon"][href]"#, "href"),
    ("script[src]", "src"),
    ("img[src]", "src"),
    ("source[src]", "src"),
    ("video[poster]", "poster"),
    ("audio[src]", "src"),
];

#[allow(clippy::expect_used)]
static SELECTORS: LazyLock<Vec<(Selector, &'static str)>> = LazyLock::new(|| {
    RESOURCE_SELECTORS
        .iter()
        .map(|(css, attr)| {
            (
                Selector::parse(css).expect("resource selector is valid"), // Static pattern, safe to panic
                *attr,
            )
        })
        .collect()
});

/// A sub-resource reference found in the page.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SubResource {
    /// Attribute value as it appears in the document.
    reference: String,
    /// Attributes that carry the reference.
    attrs: Vec<&'static str>,
    /// Absolute URL the reference resolves to.
    location: Url,
}

/// A fetched sub-resource ready to be written into the page.
struct Inlined {
    resource: SubResource,
    data_uri: String,
}

/// Renders a page and its sub-resources into one HTML file.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    client: Client,
    timeout: Duration,
    max_bytes: u64,
}

impl PageSnapshot {
    /// Tool name referenced by rules and stored in existing archives.
    pub const NAME: &'static str = "obelisk";

    /// Creates the tool. `timeout` bounds the whole snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] when the HTTP client cannot be built.
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self, ClientBuildError> {
        Ok(Self {
            client: build_http_client(Self::NAME, timeout)?,
            timeout,
            max_bytes,
        })
    }

    async fn snapshot(&self, url: &str, page_url: Url) -> Result<Vec<u8>, ArchiveError> {
        let response = self
            .client
            .get(page_url.clone())
            .send()
            .await
            .map_err(|e| ArchiveError::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::http_status(url, status.as_u16()));
        }
        // Redirects change the base for relative references.
        let base = response.url().clone();

        let body = read_capped(response, url, self.max_bytes).await?;

        // Parsing only needs the markup; non-UTF-8 text never reaches the output.
        let resources = collect_resources(&String::from_utf8_lossy(&body), &base);
        debug!(count = resources.len(), "collected sub-resources");

        let used = AtomicU64::new(body.len() as u64);
        let mut fetches = stream::iter(resources)
            .map(|resource| self.fetch_as_data_uri(resource, url, &used))
            .buffer_unordered(MAX_CONCURRENT_RESOURCES);

        let mut inlined = Vec::new();
        while let Some(result) = fetches.next().await {
            if let Some(resource) = result? {
                inlined.push(resource);
            }
        }

        Ok(rewrite_references(&body, &inlined))
    }

    /// Fetches one sub-resource within what is left of the byte budget.
    ///
    /// Failures leave the reference untouched; overrunning the budget fails
    /// the whole snapshot.
    async fn fetch_as_data_uri(
        &self,
        resource: SubResource,
        page_url: &str,
        used: &AtomicU64,
    ) -> Result<Option<Inlined>, ArchiveError> {
        let location = resource.location.as_str();
        let response = match self.client.get(resource.location.clone()).send().await {
            Ok(response) => response,
            Err(error) => {
                debug!(resource = %location, error = %error, "sub-resource fetch failed");
                return Ok(None);
            }
        };
        if !response.status().is_success() {
            debug!(
                resource = %location,
                status = response.status().as_u16(),
                "sub-resource returned error status"
            );
            return Ok(None);
        }

        let declared_mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(mime_essence);

        let remaining = self.max_bytes.saturating_sub(used.load(Ordering::Acquire));
        let bytes = match read_capped(response, location, remaining).await {
            Ok(bytes) => bytes,
            Err(ArchiveError::TooLarge { size, .. }) => {
                let total = used.load(Ordering::Acquire).saturating_add(size);
                return Err(ArchiveError::too_large(page_url, total, self.max_bytes));
            }
            Err(error) => {
                debug!(resource = %location, error = %error, "sub-resource skipped");
                return Ok(None);
            }
        };

        let mime = declared_mime
            .or_else(|| detect_content_type(&bytes).map(str::to_string))
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let data_uri = format!("data:{mime};base64,{}", STANDARD.encode(&bytes));

        let encoded = data_uri.len() as u64;
        let total = used.fetch_add(encoded, Ordering::AcqRel) + encoded;
        if total > self.max_bytes {
            return Err(ArchiveError::too_large(page_url, total, self.max_bytes));
        }
        Ok(Some(Inlined { resource, data_uri }))
    }
}

#[async_trait]
impl ArchivalTool for PageSnapshot {
    fn name(&self) -> &str {
        Self::NAME
    }

    #[instrument(skip(self), fields(url = %url, tool = "obelisk"))]
    async fn archive(&self, url: &str, _mime_type: &str) -> Result<ArchivedFile, ArchiveError> {
        let page_url = Url::parse(url).map_err(|_| ArchiveError::invalid_url(url))?;
        let filename = snapshot_filename(&page_url);

        let document = tokio::time::timeout(self.timeout, self.snapshot(url, page_url))
            .await
            .map_err(|_| ArchiveError::timeout(url))??;

        if document.is_empty() {
            return Err(ArchiveError::empty_output(url));
        }
        let size = document.len() as u64;
        if size > self.max_bytes {
            return Err(ArchiveError::too_large(url, size, self.max_bytes));
        }

        debug!(filename = %filename, bytes = size, "snapshot complete");
        Ok(ArchivedFile::new(filename, document, "text/html"))
    }
}

/// Finds distinct fetchable sub-resource references in `html`.
///
/// `data:` URIs and non-HTTP schemes are skipped.
fn collect_resources(html: &str, base: &Url) -> Vec<SubResource> {
    let document = Html::parse_document(html);
    let mut resources: Vec<SubResource> = Vec::new();

    for (selector, attr) in SELECTORS.iter() {
        for element in document.select(selector) {
            let Some(reference) = element.value().attr(attr) else {
                continue;
            };
            let reference = reference.trim();
            if reference.is_empty() || reference.starts_with("data:") {
                continue;
            }
            let Ok(location) = base.join(reference) else {
                debug!(reference, "unresolvable sub-resource reference");
                continue;
            };
            if !matches!(location.scheme(), "http" | "https") {
                continue;
            }
            match resources.iter().position(|r| r.reference == reference) {
                Some(index) => {
                    let attrs = &mut resources[index].attrs;
                    if !attrs.contains(attr) {
                        attrs.push(*attr);
                    }
                }
                None => resources.push(SubResource {
                    reference: reference.to_string(),
                    attrs: vec![*attr],
                    location,
                }),
            }
        }
    }

    resources
}

/// Rewrites each inlined resource's attribute values in `html` to its data URI.
///
/// Only the attributes that produced a resource are touched, and only when
/// the attribute name starts after whitespace (`data-src` is left alone).
/// Attribute values come back entity-decoded from the parser, so the
/// `&amp;`-escaped spelling is rewritten as well. Every other byte is copied
/// through unchanged.
fn rewrite_references(html: &[u8], inlined: &[Inlined]) -> Vec<u8> {
    let mut replacements: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    for Inlined { resource, data_uri } in inlined {
        let mut spellings = vec![resource.reference.clone()];
        if resource.reference.contains('&') {
            spellings.push(resource.reference.replace('&', "&amp;"));
        }
        for attr in &resource.attrs {
            for spelling in &spellings {
                for quote in ['"', '\''] {
                    replacements.push((
                        format!("{attr}={quote}{spelling}{quote}").into_bytes(),
                        format!("{attr}={quote}{data_uri}{quote}").into_bytes(),
                    ));
                }
            }
        }
    }
    if replacements.is_empty() {
        return html.to_vec();
    }

    let extra: usize = inlined.iter().map(|i| i.data_uri.len()).sum();
    let mut out = Vec::with_capacity(html.len() + extra);
    let mut pos = 0;
    while pos < html.len() {
        let hit = if pos > 0 && html[pos - 1].is_ascii_whitespace() {
            replacements
                .iter()
                .find(|(needle, _)| html[pos..].starts_with(needle))
        } else {
            None
        };
        match hit {
            Some((needle, replacement)) => {
                out.extend_from_slice(replacement);
                pos += needle.len();
            }
            None => {
                out.push(html[pos]);
                pos += 1;
            }
        }
    }
    out
}
