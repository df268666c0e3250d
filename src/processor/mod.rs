//! The archival pipeline.
//!
//! [`Processor::process_message`] extracts the URLs of a message and runs one
//! pipeline task per URL:
//!
//! 1. skip URLs this post already has an artifact for;
//! 2. probe the URL for MIME type and `ETag`;
//! 3. reuse the last artifact for the URL when its `ETag` is unchanged;
//! 4. pick a tool from the rules and fetch the content;
//! 5. reuse the last artifact when the fetched bytes hash the same, or
//!    upload a new one;
//! 6. reply in the thread and persist the records.
//!
//! # Concurrency Model
//!
//! - Each URL runs in its own Tokio task, which the caller need not join
//! - A semaphore shared by all messages caps the pipelines doing network work
//! - Permits are released automatically when a pipeline ends (RAII)

mod error;

pub use error::PipelineError;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::archiver::{ArchivedFile, ToolRegistry};
use crate::config::ArchiverConfig;
use crate::failure::FailureReason;
use crate::http_client::ClientBuildError;
use crate::notify::{AttachmentReply, Notifier};
use crate::parser::extract_urls;
use crate::probe::{ContentProber, UrlMetadata};
use crate::rules::{self, DO_NOTHING_TOOL};
use crate::storage::{ArchiveMetadata, ArchiveStorage, sha256_hex};

/// An inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Id of the post.
    pub post_id: String,
    /// Channel the post lives in; artifacts are uploaded there.
    pub channel_id: String,
    /// Thread root, when the post is itself a reply.
    pub root_id: Option<String>,
    /// Raw message text.
    pub text: String,
}

impl Message {
    /// Creates a top-level message.
    pub fn new(
        post_id: impl Into<String>,
        channel_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            post_id: post_id.into(),
            channel_id: channel_id.into(),
            root_id: None,
            text: text.into(),
        }
    }

    /// Sets the thread root.
    #[must_use]
    pub fn in_thread(mut self, root_id: impl Into<String>) -> Self {
        self.root_id = Some(root_id.into());
        self
    }
}

/// Why a URL was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The post already has an artifact for the URL.
    AlreadyArchived,
    /// The selected tool was `do_nothing`.
    DoNothing,
}

/// How a prior artifact was recognized as current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReuseKind {
    /// The server reported the same `ETag`.
    Etag,
    /// The fetched bytes hashed the same.
    ContentHash,
}

/// Terminal state of one URL pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlOutcome {
    /// Nothing was fetched or replied.
    Skipped(SkipReason),
    /// A prior artifact was attached again.
    Reused(ReuseKind),
    /// A new artifact was uploaded.
    Archived,
    /// An error reply was sent.
    Failed(FailureReason),
    /// A reused artifact could not be announced, so nothing was recorded.
    ReplyFailed,
}

/// Runs archival pipelines for messages.
///
/// Cheap to clone; clones share the prober, tools, storage, notifier and
/// admission semaphore.
#[derive(Clone)]
pub struct Processor {
    prober: Arc<ContentProber>,
    tools: Arc<ToolRegistry>,
    storage: Arc<ArchiveStorage>,
    notifier: Arc<dyn Notifier>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("tools", &self.tools)
            .field("storage", &self.storage)
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}

impl Processor {
    /// Creates a processor over existing components.
    ///
    /// `max_concurrent` is clamped to at least one pipeline.
    pub fn new(
        prober: Arc<ContentProber>,
        tools: Arc<ToolRegistry>,
        storage: Arc<ArchiveStorage>,
        notifier: Arc<dyn Notifier>,
        max_concurrent: usize,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        debug!(
            max_concurrent,
            tools = ?tools.names(),
            "creating archive processor"
        );
        Self {
            prober,
            tools,
            storage,
            notifier,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Creates a processor with the built-in tools configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] when an HTTP client cannot be built.
    pub fn from_config(
        config: &ArchiverConfig,
        storage: Arc<ArchiveStorage>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ClientBuildError> {
        let prober = ContentProber::new(config.probe_timeout())?;
        let tools = ToolRegistry::with_default_tools(&config.tool_settings())?;
        Ok(Self::new(
            Arc::new(prober),
            Arc::new(tools),
            storage,
            notifier,
            config.max_concurrent_archives,
        ))
    }

    /// Cap on concurrently running pipelines.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Registered tool names, sorted. `do_nothing` is not a tool.
    #[must_use]
    pub fn list_available_tools(&self) -> Vec<String> {
        self.tools.names()
    }

    /// The tool the rules of `config` pick for `url` and `mime_type`.
    #[must_use]
    pub fn select_tool(&self, url: &str, mime_type: &str, config: &ArchiverConfig) -> String {
        rules::select_tool(url, mime_type, &config.effective_rules())
    }

    /// Starts one pipeline per URL in `message` and returns without waiting.
    ///
    /// URLs are extracted before returning. Dropping the handles detaches
    /// the tasks.
    #[instrument(skip(self, message, config), fields(post_id = %message.post_id))]
    pub fn process_message(
        &self,
        message: &Message,
        config: Arc<ArchiverConfig>,
    ) -> Vec<JoinHandle<UrlOutcome>> {
        let urls = extract_urls(&message.text);
        if urls.is_empty() {
            return Vec::new();
        }
        debug!(url_count = urls.len(), "spawning archive pipelines");

        urls.into_iter()
            .map(|url| {
                let processor = self.clone();
                let config = Arc::clone(&config);
                let post_id = message.post_id.clone();
                let channel_id = message.channel_id.clone();
                tokio::spawn(async move {
                    processor
                        .process_url(&post_id, &channel_id, &url, &config)
                        .await
                })
            })
            .collect()
    }

    /// Runs the pipeline for one URL of a post.
    ///
    /// Waits for an admission permit first. Failures are replied to the
    /// thread and reported in the outcome, never returned.
    #[instrument(skip(self, config), fields(post_id = %post_id, url = %url))]
    pub async fn process_url(
        &self,
        post_id: &str,
        channel_id: &str,
        url: &str,
        config: &ArchiverConfig,
    ) -> UrlOutcome {
        let Ok(_permit) = self.semaphore.acquire().await else {
            warn!("admission semaphore closed, dropping URL");
            return UrlOutcome::Failed(FailureReason::Unknown);
        };

        match self.storage.is_already_archived(post_id, url).await {
            Ok(true) => {
                info!("URL already archived for this post, skipping");
                return UrlOutcome::Skipped(SkipReason::AlreadyArchived);
            }
            Ok(false) => {}
            Err(e) => error!(error = %e, "failed to check per-post archive, continuing"),
        }

        let probed = match self.prober.probe(url).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(error = %e, "failed to probe URL, proceeding with download");
                None
            }
        };
        let new_etag = probed
            .as_ref()
            .and_then(|m| m.etag.clone())
            .filter(|etag| !etag.is_empty());

        let existing = match self.storage.existing_global_archive(url).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(error = %e, "failed to read global archive, proceeding with download");
                None
            }
        };

        if let Some(prior) = existing
            .as_ref()
            .filter(|prior| etag_matches(prior, new_etag.as_deref()))
        {
            info!(file_id = %prior.file_id, "ETag unchanged, reusing archive");
            let record = self.storage.record_for_reused_artifact(post_id, url, prior);
            if !self.announce(&record, Some(&prior.post_id)).await {
                return UrlOutcome::ReplyFailed;
            }
            self.persist_per_post(&record).await;
            return UrlOutcome::Reused(ReuseKind::Etag);
        }

        let mime_type = match self.resolve_mime_type(url, probed.as_ref()).await {
            Ok(mime_type) => mime_type,
            Err(e) => return self.fail(post_id, url, e).await,
        };

        let tool_name = self.select_tool(url, &mime_type, config);
        if tool_name == DO_NOTHING_TOOL {
            info!(mime_type = %mime_type, "rules selected do_nothing, skipping");
            return UrlOutcome::Skipped(SkipReason::DoNothing);
        }
        let Some(tool) = self.tools.get(&tool_name) else {
            return self
                .fail(post_id, url, PipelineError::NoArchivalTool { tool: tool_name })
                .await;
        };

        let file = match tool.archive(url, &mime_type).await {
            Ok(file) => file,
            Err(e) => return self.fail(post_id, url, e.into()).await,
        };

        if let Some(prior) = existing.filter(|prior| hash_matches(prior, &file)) {
            return self.reuse_by_hash(post_id, url, prior, new_etag).await;
        }

        let mut record = match self
            .storage
            .store_new_artifact(post_id, channel_id, url, &file, &tool_name)
            .await
        {
            Ok(record) => record,
            Err(e) => return self.fail(post_id, url, e.into()).await,
        };
        record.etag = new_etag;

        // The artifact is stored, so a failed reply still gets recorded.
        self.announce(&record, None).await;
        self.persist_per_post(&record).await;
        if let Err(e) = self.storage.persist_global(&record).await {
            warn!(error = %e, "failed to store global archive record");
        }

        info!(file_id = %record.file_id, tool = %tool_name, "URL archived");
        UrlOutcome::Archived
    }

    async fn reuse_by_hash(
        &self,
        post_id: &str,
        url: &str,
        mut prior: ArchiveMetadata,
        new_etag: Option<String>,
    ) -> UrlOutcome {
        info!(file_id = %prior.file_id, "content hash unchanged, reusing archive");
        let mut record = self.storage.record_for_reused_artifact(post_id, url, &prior);
        if let Some(etag) = &new_etag {
            record.etag = Some(etag.clone());
        }

        if !self.announce(&record, Some(&prior.post_id)).await {
            return UrlOutcome::ReplyFailed;
        }
        self.persist_per_post(&record).await;

        if let Some(etag) = new_etag {
            prior.etag = Some(etag);
            prior.archived_at = record.archived_at;
            if let Err(e) = self.storage.persist_global(&prior).await {
                warn!(error = %e, "failed to refresh global archive record");
            }
        }
        UrlOutcome::Reused(ReuseKind::ContentHash)
    }

    async fn resolve_mime_type(
        &self,
        url: &str,
        probed: Option<&UrlMetadata>,
    ) -> Result<String, PipelineError> {
        if let Some(mime_type) = probed
            .and_then(|m| m.mime_type.as_deref())
            .filter(|m| !m.is_empty())
        {
            return Ok(mime_type.to_string());
        }
        Ok(self.prober.detect_mime_type(url).await?)
    }

    /// Sends the attachment reply; returns whether it was delivered.
    async fn announce(&self, record: &ArchiveMetadata, original_post_id: Option<&str>) -> bool {
        let reply = AttachmentReply {
            post_id: record.post_id.clone(),
            url: record.original_url.clone(),
            file_id: record.file_id.clone(),
            filename: record.filename.clone(),
            mime_type: record.mime_type.clone(),
            size: record.size,
            original_post_id: original_post_id.map(str::to_string),
        };
        match self.notifier.reply_with_attachment(&reply).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, file_id = %record.file_id, "failed to send attachment reply");
                false
            }
        }
    }

    async fn persist_per_post(&self, record: &ArchiveMetadata) {
        if let Err(e) = self.storage.persist_per_post(record).await {
            error!(error = %e, "failed to store per-post archive record");
        }
    }

    async fn fail(&self, post_id: &str, url: &str, error: PipelineError) -> UrlOutcome {
        let reason = error.reason();
        error!(error = %error, reason = %reason, "failed to archive URL");
        if let Err(e) = self.notifier.reply_with_error(post_id, url, &error).await {
            error!(error = %e, "failed to send error reply");
        }
        UrlOutcome::Failed(reason)
    }
}

/// Both `ETag`s present, non-empty and equal.
fn etag_matches(prior: &ArchiveMetadata, observed: Option<&str>) -> bool {
    match (prior.etag.as_deref(), observed) {
        (Some(old), Some(new)) => !old.is_empty() && old == new,
        _ => false,
    }
}

fn hash_matches(prior: &ArchiveMetadata, file: &ArchivedFile) -> bool {
    prior
        .content_hash
        .as_deref()
        .is_some_and(|hash| !hash.is_empty() && hash == sha256_hex(&file.bytes))
}
