//! File store writing artifacts under a local directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::fs;
use tracing::{debug, instrument};

use super::{FileStore, StoreError};
use crate::archiver::filename::sanitize_filename;

/// Length of generated artifact ids.
const ID_LEN: usize = 26;

/// Writes each upload to `<root>/<container>/<id>/<filename>`.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an artifact would have been written to.
    #[must_use]
    pub fn artifact_path(&self, container_id: &str, id: &str, filename: &str) -> PathBuf {
        self.root
            .join(sanitize_filename(container_id))
            .join(id)
            .join(sanitize_filename(filename))
    }
}

fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

#[async_trait]
impl FileStore for LocalFileStore {
    #[instrument(skip(self, bytes), fields(container = %container_id, filename = %filename, size = bytes.len()))]
    async fn upload(
        &self,
        bytes: &[u8],
        container_id: &str,
        filename: &str,
    ) -> Result<String, StoreError> {
        let id = generate_id();
        let path = self.artifact_path(container_id, &id, filename);
        let Some(dir) = path.parent() else {
            return Err(StoreError::rejected(format!(
                "artifact path has no parent: {}",
                path.display()
            )));
        };

        fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::io(dir, e))?;
        fs::write(&path, bytes)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        debug!(file_id = %id, path = %path.display(), "artifact written");
        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_upload_writes_under_container_and_id() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(temp_dir.path());

        let id = store.upload(b"payload", "town-square", "report.pdf").await.unwrap();

        assert_eq!(id.len(), ID_LEN);
        let path = temp_dir.path().join("town-square").join(&id).join("report.pdf");
        assert_eq!(std::fs::read(path).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_local_upload_sanitizes_path_components() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(temp_dir.path());

        let id = store.upload(b"x", "..", "../../escape.txt").await.unwrap();

        let path = store.artifact_path("..", &id, "../../escape.txt");
        assert!(path.starts_with(temp_dir.path()));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_local_upload_ids_differ() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(temp_dir.path());

        let a = store.upload(b"a", "c", "same.txt").await.unwrap();
        let b = store.upload(b"b", "c", "same.txt").await.unwrap();

        assert_ne!(a, b);
    }
}
