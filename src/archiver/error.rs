//! Error types for archival tools.

use thiserror::Error;

/// Errors that can occur while an archival tool fetches content.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The fetch did not finish within the tool's timeout.
    #[error("timeout archiving {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error archiving {url}: {source}")]
    Network {
        /// The URL being archived.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} archiving {url}")]
    HttpStatus {
        /// The URL being archived.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Content exceeds the tool's size ceiling.
    #[error("content from {url} is {size} bytes, exceeding the {limit} byte limit")]
    TooLarge {
        /// The URL being archived.
        url: String,
        /// Observed (or declared) size in bytes.
        size: u64,
        /// The tool's ceiling in bytes.
        limit: u64,
    },

    /// The tool produced no bytes.
    #[error("archiving {url} produced empty content")]
    EmptyOutput {
        /// The URL being archived.
        url: String,
    },
}

impl ArchiveError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Maps a reqwest transport error, separating timeouts from other failures.
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a size ceiling error.
    pub fn too_large(url: impl Into<String>, size: u64, limit: u64) -> Self {
        Self::TooLarge {
            url: url.into(),
            size,
            limit,
        }
    }

    /// Creates an empty output error.
    pub fn empty_output(url: impl Into<String>) -> Self {
        Self::EmptyOutput { url: url.into() }
    }
}
