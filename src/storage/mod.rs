//! Archive records and artifact storage.
//!
//! Two record families live in the key-value store:
//!
//! - **per-post** lists under `archive_post_<postId>_<sha256(url)>`, appended
//!   to whenever a post gets an artifact for a URL;
//! - **global** records under `archive_url_<sha256(url)>`, holding the most
//!   recent artifact for a URL across all posts.
//!
//! [`ArchiveStorage`] is the only component that reads or writes either
//! family. Read-modify-write updates are serialized per key inside the
//! process.

mod error;
mod metadata;

pub use error::StorageError;
pub use metadata::{
    ArchiveMetadata, GLOBAL_KEY_PREFIX, PER_POST_KEY_PREFIX, global_key, per_post_key, sha256_hex,
};

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument, warn};

use crate::archiver::ArchivedFile;
use crate::store::{FileStore, KvStore};

/// Reads and writes archive records and uploads artifacts.
pub struct ArchiveStorage {
    kv: Arc<dyn KvStore>,
    files: Arc<dyn FileStore>,
    /// Clone the `Arc` to release the `DashMap` shard before awaiting the lock.
    /// Entries live only while some task holds or waits on them.
    key_locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Exclusive access to one key; the map entry is dropped with the last user.
struct KeyLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        // Release first so the guard's own `Arc` no longer counts.
        self.guard.take();
        self.locks
            .remove_if(self.key.as_str(), |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl std::fmt::Debug for ArchiveStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveStorage")
            .field("locked_keys", &self.key_locks.len())
            .finish_non_exhaustive()
    }
}

impl ArchiveStorage {
    /// Creates a storage layer over the given backends.
    pub fn new(kv: Arc<dyn KvStore>, files: Arc<dyn FileStore>) -> Self {
        Self {
            kv,
            files,
            key_locks: DashMap::new(),
        }
    }

    /// Whether `url` already has a record in `post_id`'s list.
    ///
    /// An undecodable list counts as "not archived".
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Kv`] if the store cannot be read.
    #[instrument(skip(self), fields(post_id = %post_id, url = %url))]
    pub async fn is_already_archived(
        &self,
        post_id: &str,
        url: &str,
    ) -> Result<bool, StorageError> {
        let key = per_post_key(post_id, url);
        let Some(raw) = self.read(&key).await? else {
            return Ok(false);
        };
        match serde_json::from_slice::<Vec<ArchiveMetadata>>(&raw) {
            Ok(records) => Ok(records.iter().any(|record| record.original_url == url)),
            Err(error) => {
                debug!(
                    key = %key,
                    error = %error,
                    "undecodable per-post list, treating as not archived"
                );
                Ok(false)
            }
        }
    }

    /// All records in `post_id`'s list for `url`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Kv`] if the store cannot be read, or
    /// [`StorageError::Corrupt`] if the list cannot be decoded.
    #[instrument(skip(self), fields(post_id = %post_id, url = %url))]
    pub async fn per_post_records(
        &self,
        post_id: &str,
        url: &str,
    ) -> Result<Vec<ArchiveMetadata>, StorageError> {
        let key = per_post_key(post_id, url);
        match self.read(&key).await? {
            Some(raw) => serde_json::from_slice(&raw).map_err(|e| StorageError::corrupt(key, e)),
            None => Ok(Vec::new()),
        }
    }

    /// The most recent artifact recorded for `url` across all posts.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Kv`] if the store cannot be read, or
    /// [`StorageError::Corrupt`] if the record cannot be decoded.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn existing_global_archive(
        &self,
        url: &str,
    ) -> Result<Option<ArchiveMetadata>, StorageError> {
        let key = global_key(url);
        match self.read(&key).await? {
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| StorageError::corrupt(key, e)),
            None => Ok(None),
        }
    }

    /// Uploads `file` to `channel_id` and returns its record.
    ///
    /// The record is not persisted and carries no `ETag`; the caller decides
    /// which families to write it to.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Upload`] if the file store rejects the upload.
    #[instrument(skip(self, file), fields(post_id = %post_id, url = %url, tool = %tool, size = file.size))]
    pub async fn store_new_artifact(
        &self,
        post_id: &str,
        channel_id: &str,
        url: &str,
        file: &ArchivedFile,
        tool: &str,
    ) -> Result<ArchiveMetadata, StorageError> {
        let file_id = self
            .files
            .upload(&file.bytes, channel_id, &file.filename)
            .await
            .map_err(|e| StorageError::upload(&file.filename, e))?;
        debug!(file_id = %file_id, "artifact uploaded");

        Ok(ArchiveMetadata {
            post_id: post_id.to_string(),
            original_url: url.to_string(),
            file_id,
            filename: file.filename.clone(),
            mime_type: file.mime_type.clone(),
            archived_at: Utc::now(),
            tool_used: tool.to_string(),
            size: file.size,
            etag: None,
            content_hash: Some(sha256_hex(&file.bytes)),
        })
    }

    /// A fresh record for `post_id` pointing at `prior`'s artifact.
    #[must_use]
    pub fn record_for_reused_artifact(
        &self,
        post_id: &str,
        url: &str,
        prior: &ArchiveMetadata,
    ) -> ArchiveMetadata {
        ArchiveMetadata {
            post_id: post_id.to_string(),
            original_url: url.to_string(),
            archived_at: Utc::now(),
            ..prior.clone()
        }
    }

    /// Appends `metadata` to its post's list.
    ///
    /// An undecodable existing list is replaced by a single-entry list.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the list cannot be read, encoded or written.
    #[instrument(skip(self, metadata), fields(post_id = %metadata.post_id, url = %metadata.original_url, file_id = %metadata.file_id))]
    pub async fn persist_per_post(&self, metadata: &ArchiveMetadata) -> Result<(), StorageError> {
        let key = per_post_key(&metadata.post_id, &metadata.original_url);
        let _lock = self.lock_key(&key).await;

        let mut records = match self.read(&key).await? {
            Some(raw) => {
                serde_json::from_slice::<Vec<ArchiveMetadata>>(&raw).unwrap_or_else(|error| {
                    warn!(key = %key, error = %error, "replacing undecodable per-post list");
                    Vec::new()
                })
            }
            None => Vec::new(),
        };
        records.push(metadata.clone());

        let encoded = serde_json::to_vec(&records).map_err(|e| StorageError::encode(&key, e))?;
        self.write(&key, &encoded).await
    }

    /// Overwrites the global record for `metadata.original_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the record cannot be encoded or written.
    #[instrument(skip(self, metadata), fields(url = %metadata.original_url, file_id = %metadata.file_id))]
    pub async fn persist_global(&self, metadata: &ArchiveMetadata) -> Result<(), StorageError> {
        let key = global_key(&metadata.original_url);
        let _lock = self.lock_key(&key).await;

        let encoded = serde_json::to_vec(metadata).map_err(|e| StorageError::encode(&key, e))?;
        self.write(&key, &encoded).await
    }

    async fn lock_key(&self, key: &str) -> KeyLock<'_> {
        // Built before waiting so a cancelled wait still cleans up the entry.
        let mut held = KeyLock {
            locks: &self.key_locks,
            key: key.to_string(),
            guard: None,
        };
        let lock = self
            .key_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        held.guard = Some(lock.lock_owned().await);
        held
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.kv.get(key).await.map_err(|e| StorageError::kv(key, e))
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.kv
            .set(key, value)
            .await
            .map_err(|e| StorageError::kv(key, e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::{MemoryFileStore, MemoryKvStore, StoreError};
    use async_trait::async_trait;

    fn storage() -> (ArchiveStorage, MemoryKvStore, MemoryFileStore) {
        let kv = MemoryKvStore::new();
        let files = MemoryFileStore::new();
        let storage = ArchiveStorage::new(Arc::new(kv.clone()), Arc::new(files.clone()));
        (storage, kv, files)
    }

    fn pdf() -> ArchivedFile {
        ArchivedFile::new("a.pdf", b"%PDF-1.4 body".to_vec(), "application/pdf")
    }

    #[tokio::test]
    async fn test_store_new_artifact_uploads_and_hashes() {
        let (storage, kv, files) = storage();

        let metadata = storage
            .store_new_artifact("p1", "chan", "https://e.com/a.pdf", &pdf(), "direct_download")
            .await
            .unwrap();

        assert_eq!(metadata.content_hash.as_deref(), Some(sha256_hex(b"%PDF-1.4 body").as_str()));
        assert_eq!(metadata.etag, None);
        assert_eq!(metadata.size, 13);
        assert_eq!(files.file(&metadata.file_id).unwrap().container_id, "chan");
        assert!(kv.is_empty(), "storing an artifact must not persist records");
    }

    #[tokio::test]
    async fn test_round_trip_per_post_and_global() {
        let (storage, _, _) = storage();
        let url = "https://e.com/a.pdf";
        let metadata = storage
            .store_new_artifact("p1", "chan", url, &pdf(), "direct_download")
            .await
            .unwrap();

        assert!(!storage.is_already_archived("p1", url).await.unwrap());
        storage.persist_per_post(&metadata).await.unwrap();
        storage.persist_global(&metadata).await.unwrap();

        assert!(storage.is_already_archived("p1", url).await.unwrap());
        assert!(!storage.is_already_archived("p2", url).await.unwrap());
        let global = storage.existing_global_archive(url).await.unwrap().unwrap();
        assert_eq!(global, metadata);
        assert_eq!(
            global.content_hash.as_deref(),
            Some(sha256_hex(b"%PDF-1.4 body").as_str())
        );
    }

    #[tokio::test]
    async fn test_persist_per_post_appends() {
        let (storage, _, _) = storage();
        let url = "https://e.com/a.pdf";
        let first = storage
            .store_new_artifact("p1", "chan", url, &pdf(), "direct_download")
            .await
            .unwrap();
        let second = storage.record_for_reused_artifact("p1", url, &first);

        storage.persist_per_post(&first).await.unwrap();
        storage.persist_per_post(&second).await.unwrap();

        let records = storage.per_post_records("p1", url).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].file_id, records[1].file_id);
    }

    #[tokio::test]
    async fn test_undecodable_per_post_list_is_not_archived_and_gets_replaced() {
        let (storage, kv, _) = storage();
        let url = "https://e.com/a.pdf";
        kv.set(&per_post_key("p1", url), b"not json").await.unwrap();

        assert!(!storage.is_already_archived("p1", url).await.unwrap());

        let metadata = storage
            .store_new_artifact("p1", "chan", url, &pdf(), "direct_download")
            .await
            .unwrap();
        storage.persist_per_post(&metadata).await.unwrap();

        assert_eq!(storage.per_post_records("p1", url).await.unwrap(), vec![metadata]);
    }

    #[tokio::test]
    async fn test_corrupt_global_record_is_an_error() {
        let (storage, kv, _) = storage();
        let url = "https://e.com/a.pdf";
        kv.set(&global_key(url), b"{").await.unwrap();

        let result = storage.existing_global_archive(url).await;

        assert!(matches!(result, Err(StorageError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_record_for_reused_artifact_copies_file_fields() {
        let (storage, _, _) = storage();
        let mut prior = storage
            .store_new_artifact("p1", "chan", "https://e.com/a.pdf", &pdf(), "obelisk")
            .await
            .unwrap();
        prior.etag = Some("v1".to_string());

        let reused = storage.record_for_reused_artifact("p2", "https://e.com/a.pdf", &prior);

        assert_eq!(reused.post_id, "p2");
        assert_eq!(reused.file_id, prior.file_id);
        assert_eq!(reused.tool_used, "obelisk");
        assert_eq!(reused.etag.as_deref(), Some("v1"));
        assert_eq!(reused.content_hash, prior.content_hash);
        assert!(reused.archived_at >= prior.archived_at);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let (storage, _, _) = storage();
        let storage = Arc::new(storage);
        let url = "https://e.com/a.pdf";
        let base = storage
            .store_new_artifact("p1", "chan", url, &pdf(), "direct_download")
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let storage = Arc::clone(&storage);
            let record = base.clone();
            handles.push(tokio::spawn(async move {
                storage.persist_per_post(&record).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(storage.per_post_records("p1", url).await.unwrap().len(), 20);
        assert!(storage.key_locks.is_empty());
    }

    #[tokio::test]
    async fn test_key_locks_are_released_after_persisting() {
        let (storage, _, _) = storage();

        for n in 0..50 {
            let url = format!("https://e.com/{n}.pdf");
            let record = storage
                .store_new_artifact("p1", "chan", &url, &pdf(), "direct_download")
                .await
                .unwrap();
            storage.persist_per_post(&record).await.unwrap();
            storage.persist_global(&record).await.unwrap();
        }

        assert!(storage.key_locks.is_empty());
        assert!(storage.is_already_archived("p1", "https://e.com/49.pdf").await.unwrap());
    }

    struct FailingFiles;

    #[async_trait]
    impl FileStore for FailingFiles {
        async fn upload(&self, _: &[u8], _: &str, _: &str) -> Result<String, StoreError> {
            Err(StoreError::rejected("quota exceeded"))
        }
    }

    #[tokio::test]
    async fn test_upload_failure_is_reported() {
        let storage = ArchiveStorage::new(Arc::new(MemoryKvStore::new()), Arc::new(FailingFiles));

        let result = storage
            .store_new_artifact("p1", "chan", "https://e.com/a.pdf", &pdf(), "direct_download")
            .await;

        assert!(matches!(result, Err(StorageError::Upload { .. })));
    }
}
