//! Error types for URL metadata probing.

use thiserror::Error;

/// Errors that can occur while probing a URL for its metadata.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The probe request timed out.
    #[error("timeout probing {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Network-level failure (DNS, connection refused, TLS, ...).
    #[error("network error probing {url}: {source}")]
    Network {
        /// The URL being probed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a client or server error status.
    #[error("HTTP {status} probing {url}")]
    HttpStatus {
        /// The URL being probed.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Neither a Content-Type header nor the first body bytes revealed the type.
    #[error("could not determine MIME type for {url}")]
    UndetectedContentType {
        /// The URL being probed.
        url: String,
    },
}

impl ProbeError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
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

    /// Creates an undetected content type error.
    pub fn undetected(url: impl Into<String>) -> Self {
        Self::UndetectedContentType { url: url.into() }
    }
}
