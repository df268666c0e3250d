//! Config command handlers: validate the config and preview rule decisions.

use std::path::Path;

use anyhow::Result;
use link_archiver::{ToolRegistry, load_config, select_tool};

use crate::cli::SelectToolArgs;

pub fn run_check_config_command(config_path: Option<&Path>) -> Result<()> {
    let loaded = load_config(config_path)?;
    let config = &loaded.config;

    let resolved_path = loaded.path.as_ref().map_or_else(
        || "<unresolved>".to_string(),
        |path| path.display().to_string(),
    );
    println!("config_path = {resolved_path}");
    println!(
        "config_file = {}",
        if loaded.loaded_from_file {
            "loaded"
        } else {
            "not found (using defaults)"
        }
    );
    println!("default_archival_tool = {}", config.default_archival_tool);
    println!("max_concurrent_archives = {}", config.max_concurrent_archives);
    println!("probe_timeout_secs = {}", config.probe_timeout_secs);
    println!("download_timeout_secs = {}", config.download_timeout_secs);
    println!("snapshot_timeout_secs = {}", config.snapshot_timeout_secs);
    println!("max_download_bytes = {}", config.max_download_bytes);
    println!("max_snapshot_bytes = {}", config.max_snapshot_bytes);

    println!("rules:");
    for (index, rule) in config.effective_rules().iter().enumerate() {
        let pattern = if rule.pattern.is_empty() {
            "<any>"
        } else {
            rule.pattern.as_str()
        };
        println!("  {index}. {} {pattern} -> {}", rule.kind, rule.tool);
    }

    let registered = ToolRegistry::with_default_tools(&config.tool_settings())?.names();
    for tool in config.unknown_tools(&registered) {
        println!("warning: tool `{tool}` is not available; matching URLs will fail");
    }

    Ok(())
}

pub fn run_select_tool_command(args: &SelectToolArgs, config_path: Option<&Path>) -> Result<()> {
    let loaded = load_config(config_path)?;
    let tool = select_tool(&args.url, &args.mime, &loaded.config.effective_rules());
    println!("{tool}");
    Ok(())
}
