//! Persistence collaborators: an opaque key-value store and a binary file store.
//!
//! The archive storage layer only ever needs `get`/`set` on byte blobs and a
//! single `upload` call for artifacts, so these traits stay that small. Each
//! has an in-memory backend for tests and embedding plus a durable one for
//! the CLI host.

mod local;
mod memory;
mod sqlite;

pub use local::LocalFileStore;
pub use memory::{MemoryFileStore, MemoryKvStore, StoredFile};
pub use sqlite::SqliteKvStore;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A key-value operation failed in the database.
    #[error("key-value store error for key {key}: {source}")]
    Database {
        /// The key being read or written.
        key: String,
        /// The underlying database error.
        #[source]
        source: sqlx::Error,
    },

    /// Writing an artifact to disk failed.
    #[error("IO error writing {path}: {source}")]
    Io {
        /// The path being written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The backend refused the operation.
    #[error("store rejected operation: {reason}")]
    Rejected {
        /// Why the operation was refused.
        reason: String,
    },
}

impl StoreError {
    /// Creates a database error for `key`.
    pub fn database(key: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Database {
            key: key.into(),
            source,
        }
    }

    /// Creates an IO error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a rejection error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Opaque byte blobs addressed by string keys.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads the value at `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes `value` at `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

/// Binary artifact storage.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Stores `bytes` under `container_id` and returns a new artifact id.
    async fn upload(
        &self,
        bytes: &[u8],
        container_id: &str,
        filename: &str,
    ) -> Result<String, StoreError>;
}
