//! Show command handler: print the stored records for a post's URL.

use std::sync::Arc;

use anyhow::{Context, Result};
use link_archiver::{ArchiveStorage, Database, MemoryFileStore, SqliteKvStore};

use crate::cli::ShowArgs;

pub async fn run_show_command(args: &ShowArgs) -> Result<()> {
    if !args.db.exists() {
        anyhow::bail!("Database does not exist: {}", args.db.display());
    }
    let db = Database::new(&args.db)
        .await
        .with_context(|| format!("Failed to open database: {}", args.db.display()))?;
    let storage = ArchiveStorage::new(
        Arc::new(SqliteKvStore::new(db.clone())),
        Arc::new(MemoryFileStore::new()),
    );

    let records = storage.per_post_records(&args.post_id, &args.url).await?;
    if records.is_empty() {
        println!("no archive records for {} in post {}", args.url, args.post_id);
    } else {
        println!("{}", serde_json::to_string_pretty(&records)?);
    }

    if let Some(global) = storage.existing_global_archive(&args.url).await? {
        println!("latest archive: file {} from post {}", global.file_id, global.post_id);
    }

    db.close().await;
    Ok(())
}
