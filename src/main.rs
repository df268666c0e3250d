//! CLI entry point for the link archiver.

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod cli;
mod commands;

use cli::{Args, Command, WatchArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Replies go to stdout, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config_path = args.config.as_deref();
    match args.command {
        None => commands::run_watch_command(&WatchArgs::default(), config_path).await,
        Some(Command::Watch(watch)) => commands::run_watch_command(&watch, config_path).await,
        Some(Command::Tools) => commands::run_tools_command(config_path),
        Some(Command::SelectTool(select)) => {
            commands::run_select_tool_command(&select, config_path)
        }
        Some(Command::CheckConfig) => commands::run_check_config_command(config_path),
        Some(Command::Show(show)) => commands::run_show_command(&show).await,
    }
}
