//! Tools command handler: list the registered archival tools.

use std::path::Path;

use anyhow::Result;
use link_archiver::{ToolRegistry, load_config};

pub fn run_tools_command(config_path: Option<&Path>) -> Result<()> {
    let loaded = load_config(config_path)?;
    let registry = ToolRegistry::with_default_tools(&loaded.config.tool_settings())?;
    for name in registry.names() {
        println!("{name}");
    }
    Ok(())
}
