//! SQLite-backed key-value store.

use async_trait::async_trait;
use tracing::instrument;

use super::{KvStore, StoreError};
use crate::db::Database;

/// Key-value store persisted in the `kv_store` table.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    db: Database,
}

impl SqliteKvStore {
    /// Wraps an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The underlying database.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| StoreError::database(key, e))?;

        Ok(row.map(|(value,)| value))
    }

    #[instrument(skip(self, value), fields(size = value.len()))]
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, datetime('now'))
              ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .execute(self.db.pool())
        .await
        .map_err(|e| StoreError::database(key, e))?;

        Ok(())
    }
}
