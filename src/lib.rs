//! Link Archiver Library
//!
//! This library archives the content behind links posted in chat messages.
//! Every distinct piece of content is fetched and stored once; later posts of
//! the same URL get the existing artifact back when the server's `ETag` or the
//! content hash shows nothing changed.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`parser`] - URL extraction from message text
//! - [`probe`] - `HEAD`/`GET` probing for MIME type, `ETag` and size
//! - [`rules`] - Ordered, first-match-wins tool selection
//! - [`archiver`] - Archival tools (direct download, page snapshot)
//! - [`storage`] - Archive records and deduplication lookups
//! - [`store`] - Key-value and file store backends
//! - [`processor`] - The per-URL pipeline tying everything together
//! - [`notify`] - Thread replies
//! - [`config`] - Configuration snapshots

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archiver;
pub mod config;
pub mod db;
pub mod failure;
pub mod http_client;
pub mod notify;
pub mod parser;
pub mod probe;
pub mod processor;
pub mod rules;
pub mod storage;
pub mod store;
mod user_agent;

// Re-export commonly used types
pub use archiver::{
    ArchivalTool, ArchiveError, ArchivedFile, DirectDownload, PageSnapshot, ToolRegistry,
    ToolSettings,
};
pub use config::{ArchiverConfig, ConfigError, ConfigHandle, load_config};
pub use db::Database;
pub use failure::{FailureCategory, FailureReason};
pub use notify::{AttachmentReply, ConsoleNotifier, MemoryNotifier, Notifier, NotifyError};
pub use parser::extract_urls;
pub use probe::{ContentProber, ProbeError, UrlMetadata};
pub use processor::{Message, PipelineError, Processor, ReuseKind, SkipReason, UrlOutcome};
pub use rules::{ArchivalRule, DO_NOTHING_TOOL, RuleKind, select_tool};
pub use storage::{ArchiveMetadata, ArchiveStorage, StorageError};
pub use store::{
    FileStore, KvStore, LocalFileStore, MemoryFileStore, MemoryKvStore, SqliteKvStore, StoreError,
};
