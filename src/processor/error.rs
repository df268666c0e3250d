//! Pipeline failures reported back to the message thread.

use thiserror::Error;

use crate::archiver::ArchiveError;
use crate::failure::FailureReason;
use crate::probe::ProbeError;
use crate::storage::StorageError;

/// A terminal failure of one URL pipeline.
///
/// Every variant maps to a [`FailureReason`] without looking at message text.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Content type detection failed.
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// The archival tool failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The artifact could not be stored.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A rule selected a tool that is not registered.
    #[error("archival tool not found: {tool}")]
    NoArchivalTool {
        /// The selected tool name.
        tool: String,
    },
}

impl PipelineError {
    /// The classified reason shown to users.
    #[must_use]
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Probe(e) => FailureReason::from(e),
            Self::Archive(e) => FailureReason::from(e),
            Self::Storage(e) => FailureReason::from(e),
            Self::NoArchivalTool { .. } => FailureReason::NoArchivalTool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn test_reason_follows_source_error() {
        let probe = PipelineError::from(ProbeError::undetected("u"));
        assert_eq!(probe.reason(), FailureReason::UndetectedContentType);

        let archive = PipelineError::from(ArchiveError::http_status("u", 404));
        assert_eq!(archive.reason(), FailureReason::HttpClientError);

        let storage = PipelineError::from(StorageError::upload(
            "a.pdf",
            StoreError::rejected("quota"),
        ));
        assert_eq!(storage.reason(), FailureReason::StorageFailed);

        let policy = PipelineError::NoArchivalTool {
            tool: "wayback".to_string(),
        };
        assert_eq!(policy.reason(), FailureReason::NoArchivalTool);
        assert_eq!(policy.to_string(), "archival tool not found: wayback");
    }
}
