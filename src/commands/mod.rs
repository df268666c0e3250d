//! CLI command handlers.

mod config;
mod show;
mod tools;
mod watch;

pub use config::{run_check_config_command, run_select_tool_command};
pub use show::run_show_command;
pub use tools::run_tools_command;
pub use watch::run_watch_command;
