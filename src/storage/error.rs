//! Error types for the archive storage layer.

use thiserror::Error;

use crate::store::StoreError;

/// Errors from reading or writing archive records and artifacts.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The key-value store failed.
    #[error("failed to access archive record {key}: {source}")]
    Kv {
        /// The record key.
        key: String,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// Uploading the artifact failed.
    #[error("failed to upload {filename}: {source}")]
    Upload {
        /// Filename of the artifact.
        filename: String,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// A stored record could not be decoded.
    #[error("corrupt archive record {key}: {source}")]
    Corrupt {
        /// The record key.
        key: String,
        /// The decode error.
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be encoded.
    #[error("failed to encode archive record {key}: {source}")]
    Encode {
        /// The record key.
        key: String,
        /// The encode error.
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Creates a key-value access error.
    pub fn kv(key: impl Into<String>, source: StoreError) -> Self {
        Self::Kv {
            key: key.into(),
            source,
        }
    }

    /// Creates an upload error.
    pub fn upload(filename: impl Into<String>, source: StoreError) -> Self {
        Self::Upload {
            filename: filename.into(),
            source,
        }
    }

    /// Creates a decode error.
    pub fn corrupt(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Corrupt {
            key: key.into(),
            source,
        }
    }

    /// Creates an encode error.
    pub fn encode(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Encode {
            key: key.into(),
            source,
        }
    }
}
