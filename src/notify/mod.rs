//! Replies to the thread of the message that contained a URL.
//!
//! The [`Notifier`] trait is the outbound edge of the pipeline: one reply per
//! terminal outcome, either an attachment or an error. Rendering of the reply
//! text lives here too so every notifier words replies the same way.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::info;

use crate::failure::FailureReason;
use crate::processor::PipelineError;

/// A successful archive (or reuse) to announce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentReply {
    /// Post whose thread receives the reply.
    pub post_id: String,
    /// The archived URL.
    pub url: String,
    /// Artifact id to attach.
    pub file_id: String,
    /// Artifact filename.
    pub filename: String,
    /// Artifact MIME type.
    pub mime_type: String,
    /// Artifact size in bytes.
    pub size: u64,
    /// Post that first archived the artifact, when it is being reused.
    pub original_post_id: Option<String>,
}

/// Reply delivery failed.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The reply could not be delivered.
    #[error("failed to reply to post {post_id}: {reason}")]
    Delivery {
        /// Post the reply was for.
        post_id: String,
        /// Why delivery failed.
        reason: String,
    },
}

impl NotifyError {
    /// Creates a delivery error.
    pub fn delivery(post_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Delivery {
            post_id: post_id.into(),
            reason: reason.into(),
        }
    }
}

/// Posts replies into a message's thread.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Replies with the artifact attached.
    async fn reply_with_attachment(&self, reply: &AttachmentReply) -> Result<(), NotifyError>;

    /// Replies with a failure description.
    async fn reply_with_error(
        &self,
        post_id: &str,
        url: &str,
        error: &PipelineError,
    ) -> Result<(), NotifyError>;
}

/// Human-readable size with binary units (`512 B`, `1.5 KB`, `2.0 MB`).
#[must_use]
pub fn format_file_size(size: u64) -> String {
    const UNIT: u64 = 1024;
    if size < UNIT {
        return format!("{size} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = size / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    #[allow(clippy::cast_precision_loss)]
    let value = size as f64 / div as f64;
    format!("{value:.1} {prefix}B")
}

/// Relative permalink to a post.
#[must_use]
pub fn permalink(post_id: &str) -> String {
    format!("/pl/{post_id}")
}

/// Success reply text.
#[must_use]
pub fn render_success(reply: &AttachmentReply) -> String {
    let mut message = format!(
        "✅ Successfully archived: {}\n\n**File:** {}\n**Size:** {}\n**Type:** {}",
        reply.url,
        reply.filename,
        format_file_size(reply.size),
        reply.mime_type,
    );
    if let Some(original) = reply
        .original_post_id
        .as_deref()
        .filter(|original| !original.is_empty() && *original != reply.post_id)
    {
        message.push_str(&format!(
            "\n\n📎 Originally archived in [this post]({})",
            permalink(original)
        ));
    }
    message
}

/// Failure reply text.
#[must_use]
pub fn render_failure(url: &str, error: &PipelineError) -> String {
    format!(
        "❌ Failed to archive: {url}\n\n**Error:** {error}\n**Reason:** {}",
        error.reason().label()
    )
}

/// Prints replies to a writer (stdout by default) and logs them.
///
/// Posts are threaded under the root registered with
/// [`register_thread`](Self::register_thread), or under themselves.
pub struct ConsoleNotifier {
    out: Mutex<Box<dyn Write + Send>>,
    roots: DashMap<String, String>,
}

impl std::fmt::Debug for ConsoleNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleNotifier")
            .field("threads", &self.roots.len())
            .finish_non_exhaustive()
    }
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl ConsoleNotifier {
    /// Creates a notifier writing to `out`.
    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            roots: DashMap::new(),
        }
    }

    /// Records that `post_id` is a reply inside `root_id`'s thread.
    pub fn register_thread(&self, post_id: &str, root_id: &str) {
        if !root_id.is_empty() {
            self.roots.insert(post_id.to_string(), root_id.to_string());
        }
    }

    /// The thread root replies for `post_id` go under.
    #[must_use]
    pub fn thread_root(&self, post_id: &str) -> String {
        self.roots
            .get(post_id)
            .map_or_else(|| post_id.to_string(), |root| root.clone())
    }

    fn emit(&self, post_id: &str, body: &str) -> Result<(), NotifyError> {
        let root = self.thread_root(post_id);
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "[thread {root}] {}", body.replace('\n', "\n    "))
            .and_then(|()| out.flush())
            .map_err(|e| NotifyError::delivery(post_id, e.to_string()))
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn reply_with_attachment(&self, reply: &AttachmentReply) -> Result<(), NotifyError> {
        info!(
            post_id = %reply.post_id,
            file_id = %reply.file_id,
            url = %reply.url,
            reused = reply.original_post_id.is_some(),
            "archive reply"
        );
        self.emit(&reply.post_id, &render_success(reply))
    }

    async fn reply_with_error(
        &self,
        post_id: &str,
        url: &str,
        error: &PipelineError,
    ) -> Result<(), NotifyError> {
        info!(post_id, url, reason = %error.reason(), "failure reply");
        self.emit(post_id, &render_failure(url, error))
    }
}

/// A reply captured by [`MemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentReply {
    /// An attachment reply.
    Attachment(AttachmentReply),
    /// A failure reply.
    Failure {
        /// Post whose thread received the reply.
        post_id: String,
        /// The URL that failed.
        url: String,
        /// Classified reason.
        reason: FailureReason,
        /// Rendered reply text.
        message: String,
    },
}

/// Keeps replies in memory, for embedding hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    replies: Arc<Mutex<Vec<SentReply>>>,
}

impl MemoryNotifier {
    /// Creates an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies sent so far, in order.
    #[must_use]
    pub fn replies(&self) -> Vec<SentReply> {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, reply: SentReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(reply);
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn reply_with_attachment(&self, reply: &AttachmentReply) -> Result<(), NotifyError> {
        self.push(SentReply::Attachment(reply.clone()));
        Ok(())
    }

    async fn reply_with_error(
        &self,
        post_id: &str,
        url: &str,
        error: &PipelineError,
    ) -> Result<(), NotifyError> {
        self.push(SentReply::Failure {
            post_id: post_id.to_string(),
            url: url.to_string(),
            reason: error.reason(),
            message: render_failure(url, error),
        });
        Ok(())
    }
}
