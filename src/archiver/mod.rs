//! Pluggable archival tools.
//!
//! An [`ArchivalTool`] turns a URL into an [`ArchivedFile`]: the bytes to keep
//! plus a filename and MIME type. Two tools ship with the crate:
//!
//! - [`DirectDownload`] (`direct_download`) keeps the raw response body.
//! - [`PageSnapshot`] (`obelisk`) renders a page into one self-contained HTML
//!   file with its stylesheets, scripts and images inlined.
//!
//! Tools are looked up by name through a [`ToolRegistry`].

mod direct;
mod error;
pub mod filename;
mod snapshot;

pub use direct::{DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_MAX_DOWNLOAD_BYTES, DirectDownload};
pub use error::ArchiveError;
pub use snapshot::{DEFAULT_MAX_SNAPSHOT_BYTES, DEFAULT_SNAPSHOT_TIMEOUT, PageSnapshot};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::http_client::ClientBuildError;

/// Content fetched by a tool, ready to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    /// Sanitized filename for the artifact.
    pub filename: String,
    /// The artifact bytes.
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`.
    pub mime_type: String,
    /// Length of `bytes`.
    pub size: u64,
}

impl ArchivedFile {
    /// Creates an archived file, deriving `size` from `bytes`.
    #[must_use]
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let size = bytes.len() as u64;
        Self {
            filename: filename.into(),
            bytes,
            mime_type: mime_type.into(),
            size,
        }
    }
}

/// A named strategy for fetching and packaging a URL's content.
#[async_trait]
pub trait ArchivalTool: Send + Sync {
    /// Stable tool name referenced by rules and persisted in metadata.
    fn name(&self) -> &str;

    /// Fetches `url`. `mime_type` is the probed type and only a hint.
    async fn archive(&self, url: &str, mime_type: &str) -> Result<ArchivedFile, ArchiveError>;
}

/// Timeouts and size ceilings for the built-in tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSettings {
    /// Whole-request timeout for direct downloads.
    pub download_timeout: Duration,
    /// Whole-snapshot timeout, sub-resources included.
    pub snapshot_timeout: Duration,
    /// Largest body a direct download may keep.
    pub max_download_bytes: u64,
    /// Largest snapshot document that may be produced.
    pub max_snapshot_bytes: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            snapshot_timeout: DEFAULT_SNAPSHOT_TIMEOUT,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            max_snapshot_bytes: DEFAULT_MAX_SNAPSHOT_BYTES,
        }
    }
}

/// Archival tools indexed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ArchivalTool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding [`DirectDownload`] and [`PageSnapshot`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] if either tool's HTTP client cannot be built.
    pub fn with_default_tools(settings: &ToolSettings) -> Result<Self, ClientBuildError> {
        let mut registry = Self::new();
        registry.register(Arc::new(DirectDownload::new(
            settings.download_timeout,
            settings.max_download_bytes,
        )?));
        registry.register(Arc::new(PageSnapshot::new(
            settings.snapshot_timeout,
            settings.max_snapshot_bytes,
        )?));
        Ok(registry)
    }

    /// Adds `tool`, replacing any tool already registered under its name.
    pub fn register(&mut self, tool: Arc<dyn ArchivalTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ArchivalTool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
