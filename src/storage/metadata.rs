//! Persisted archive records and their storage keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Prefix of per-post record lists.
pub const PER_POST_KEY_PREFIX: &str = "archive_post_";

/// Prefix of global per-URL records.
pub const GLOBAL_KEY_PREFIX: &str = "archive_url_";

/// One archived (or reused) artifact for a URL in a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    /// Post the record belongs to.
    pub post_id: String,
    /// URL exactly as extracted from the message.
    pub original_url: String,
    /// Artifact id in the file store.
    pub file_id: String,
    /// Artifact filename.
    pub filename: String,
    /// Artifact MIME type.
    pub mime_type: String,
    /// When this record was created.
    pub archived_at: DateTime<Utc>,
    /// Tool that produced the artifact.
    pub tool_used: String,
    /// Artifact size in bytes.
    pub size: u64,
    /// `ETag` observed when the content was last validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Lowercase hex SHA-256 of the artifact bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Key of the per-post record list for (`post_id`, `url`).
#[must_use]
pub fn per_post_key(post_id: &str, url: &str) -> String {
    format!("{PER_POST_KEY_PREFIX}{post_id}_{}", sha256_hex(url.as_bytes()))
}

/// Key of the global record for `url`.
#[must_use]
pub fn global_key(url: &str) -> String {
    format!("{GLOBAL_KEY_PREFIX}{}", sha256_hex(url.as_bytes()))
}
