//! Failure classification for user-facing error replies.
//!
//! Each pipeline failure carries a [`FailureReason`] chosen where the failure
//! happened, from the typed error, so replies never depend on the wording
//! of an error message.

use std::fmt;

use crate::archiver::ArchiveError;
use crate::probe::ProbeError;
use crate::storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureCategory {
    Network,
    Content,
    Policy,
    Storage,
    Other,
}

impl FailureCategory {
    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::Network => "🌐",
            Self::Content => "📄",
            Self::Policy => "🚫",
            Self::Storage => "💾",
            Self::Other => "⚠️",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Network => "Network",
            Self::Content => "Content",
            Self::Policy => "Policy",
            Self::Storage => "Storage",
            Self::Other => "Other",
        }
    }
}

/// Why a URL could not be archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    Timeout,
    InvalidUrl,
    DownloadFailed,
    StorageFailed,
    UndetectedContentType,
    TooLarge,
    HttpClientError,
    HttpServerError,
    NoArchivalTool,
    Unknown,
}

impl FailureReason {
    /// Short phrase shown as the reply's reason line.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Timeout => "Timeout while fetching URL",
            Self::InvalidUrl => "Invalid URL format",
            Self::DownloadFailed => "Failed to download file",
            Self::StorageFailed => "Failed to store file",
            Self::UndetectedContentType => "Could not determine content type",
            Self::TooLarge => "File too large",
            Self::HttpClientError => "HTTP client error",
            Self::HttpServerError => "HTTP server error",
            Self::NoArchivalTool => "No archival tool available",
            Self::Unknown => "Unknown error",
        }
    }

    #[must_use]
    pub fn category(self) -> FailureCategory {
        match self {
            Self::Timeout
            | Self::DownloadFailed
            | Self::HttpClientError
            | Self::HttpServerError => FailureCategory::Network,
            Self::InvalidUrl | Self::UndetectedContentType | Self::TooLarge => {
                FailureCategory::Content
            }
            Self::NoArchivalTool => FailureCategory::Policy,
            Self::StorageFailed => FailureCategory::Storage,
            Self::Unknown => FailureCategory::Other,
        }
    }

    /// Reason for an HTTP error status.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400..=499 => Self::HttpClientError,
            500..=599 => Self::HttpServerError,
            _ => Self::DownloadFailed,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<&ProbeError> for FailureReason {
    fn from(error: &ProbeError) -> Self {
        match error {
            ProbeError::InvalidUrl { .. } => Self::InvalidUrl,
            ProbeError::Timeout { .. } => Self::Timeout,
            ProbeError::Network { .. } => Self::DownloadFailed,
            ProbeError::HttpStatus { status, .. } => Self::from_status(*status),
            ProbeError::UndetectedContentType { .. } => Self::UndetectedContentType,
        }
    }
}

impl From<&ArchiveError> for FailureReason {
    fn from(error: &ArchiveError) -> Self {
        match error {
            ArchiveError::InvalidUrl { .. } => Self::InvalidUrl,
            ArchiveError::Timeout { .. } => Self::Timeout,
            ArchiveError::Network { .. } | ArchiveError::EmptyOutput { .. } => {
                Self::DownloadFailed
            }
            ArchiveError::HttpStatus { status, .. } => Self::from_status(*status),
            ArchiveError::TooLarge { .. } => Self::TooLarge,
        }
    }
}

impl From<&StorageError> for FailureReason {
    fn from(_: &StorageError) -> Self {
        Self::StorageFailed
    }
}
