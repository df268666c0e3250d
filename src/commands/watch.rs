//! Watch command handler: archive links from messages read on stdin.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use link_archiver::{
    ArchiveStorage, ConfigHandle, ConsoleNotifier, Database, FileStore, KvStore, LocalFileStore,
    MemoryFileStore, MemoryKvStore, Message, Processor, SqliteKvStore, UrlOutcome, load_config,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cli::WatchArgs;

/// Channel used when a line names none.
const DEFAULT_CHANNEL: &str = "default";

/// Input line that reloads the config file.
const RELOAD_COMMAND: &str = "!reload";

/// One parsed input line.
#[derive(Debug, PartialEq, Eq)]
struct InboundLine {
    message: Message,
    user_id: Option<String>,
}

/// Parses `post_id [channel_id [user_id [root_id]]] text`, tab-separated.
///
/// A line without tabs is all text and gets a post id from its line number.
fn parse_line(line_no: usize, line: &str) -> Option<InboundLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    let fields: Vec<&str> = line.split('\t').collect();
    let id_count = (fields.len() - 1).min(4);
    let (ids, rest) = fields.split_at(id_count);
    let field = |i: usize| ids.get(i).map(|s| s.trim()).filter(|s| !s.is_empty());

    let post_id = field(0).map_or_else(|| format!("line-{line_no}"), str::to_string);
    let channel_id = field(1).unwrap_or(DEFAULT_CHANNEL);
    let mut message = Message::new(post_id, channel_id, rest.join("\t"));
    if let Some(root_id) = field(3) {
        message = message.in_thread(root_id);
    }

    Some(InboundLine {
        message,
        user_id: field(2).map(str::to_string),
    })
}

#[derive(Debug, Default)]
struct WatchSummary {
    archived: usize,
    reused: usize,
    skipped: usize,
    failed: usize,
}

impl WatchSummary {
    async fn collect(&mut self, handle: JoinHandle<UrlOutcome>) {
        match handle.await {
            Ok(UrlOutcome::Archived) => self.archived += 1,
            Ok(UrlOutcome::Reused(_)) => self.reused += 1,
            Ok(UrlOutcome::Skipped(_)) => self.skipped += 1,
            Ok(UrlOutcome::Failed(_) | UrlOutcome::ReplyFailed) => self.failed += 1,
            Err(e) => {
                warn!(error = %e, "archive task panicked");
                self.failed += 1;
            }
        }
    }
}

pub async fn run_watch_command(args: &WatchArgs, config_path: Option<&Path>) -> Result<()> {
    let loaded = load_config(config_path)?;
    if loaded.loaded_from_file {
        info!(path = ?loaded.path, "configuration loaded");
    } else {
        info!("no config file found, using defaults (every URL is left alone)");
    }
    let config = ConfigHandle::new(loaded.config);

    let kv: Arc<dyn KvStore> = match &args.db {
        Some(path) => {
            let db = Database::new(path)
                .await
                .with_context(|| format!("Failed to open database: {}", path.display()))?;
            Arc::new(SqliteKvStore::new(db))
        }
        None => Arc::new(MemoryKvStore::new()),
    };
    let files: Arc<dyn FileStore> = match &args.store_dir {
        Some(dir) => Arc::new(LocalFileStore::new(dir)),
        None => Arc::new(MemoryFileStore::new()),
    };
    let storage = Arc::new(ArchiveStorage::new(kv, files));
    let notifier = Arc::new(ConsoleNotifier::default());

    let snapshot = config.snapshot();
    let processor = Processor::from_config(&snapshot, storage, notifier.clone())?;
    for tool in snapshot.unknown_tools(&processor.list_available_tools()) {
        warn!(tool = %tool, "config references a tool that is not available");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut handles: Vec<JoinHandle<UrlOutcome>> = Vec::new();
    let mut summary = WatchSummary::default();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;

        if line.trim() == RELOAD_COMMAND {
            match loaded.path.as_deref() {
                // Errors are logged by the handle; the previous config stays active.
                Some(path) => {
                    let _ = config.reload(path);
                }
                None => warn!("no config path to reload from"),
            }
            continue;
        }

        let Some(inbound) = parse_line(line_no, &line) else {
            continue;
        };
        if args.bot_user.is_some() && inbound.user_id == args.bot_user {
            debug!(post_id = %inbound.message.post_id, "ignoring own message");
            continue;
        }

        let message = inbound.message;
        if let Some(root_id) = &message.root_id {
            notifier.register_thread(&message.post_id, root_id);
        }
        handles.extend(processor.process_message(&message, config.snapshot()));

        let (done, pending): (Vec<_>, Vec<_>) =
            handles.into_iter().partition(JoinHandle::is_finished);
        for handle in done {
            summary.collect(handle).await;
        }
        handles = pending;
    }

    debug!(pending = handles.len(), "input closed, waiting for archive tasks");
    for handle in handles {
        summary.collect(handle).await;
    }

    info!(
        archived = summary.archived,
        reused = summary.reused,
        skipped = summary.skipped,
        failed = summary.failed,
        "watch finished"
    );
    Ok(())
}
