//! In-memory store backends.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{FileStore, KvStore, StoreError};

/// Key-value store held in a concurrent map. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All keys starting with `prefix`, sorted.
    #[must_use]
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).map(|value| value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// An artifact held by [`MemoryFileStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Container (channel) the artifact was uploaded to.
    pub container_id: String,
    /// Filename given at upload time.
    pub filename: String,
    /// Artifact bytes.
    pub bytes: Vec<u8>,
}

/// File store held in memory. Ids are sequential (`file-1`, `file-2`, ...).
#[derive(Debug, Clone, Default)]
pub struct MemoryFileStore {
    files: Arc<DashMap<String, StoredFile>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryFileStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the artifact stored under `id`.
    #[must_use]
    pub fn file(&self, id: &str) -> Option<StoredFile> {
        self.files.get(id).map(|file| file.clone())
    }

    /// Number of uploads so far.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.files.len()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn upload(
        &self,
        bytes: &[u8],
        container_id: &str,
        filename: &str,
    ) -> Result<String, StoreError> {
        let id = format!("file-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.files.insert(
            id.clone(),
            StoredFile {
                container_id: container_id.to_string(),
                filename: filename.to_string(),
                bytes: bytes.to_vec(),
            },
        );
        Ok(id)
    }
}
