//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Archive the content behind links posted in chat messages.
///
/// Messages are read from stdin, one per line. Every URL in a message is
/// archived once per distinct content, and a reply is printed for each.
#[derive(Parser, Debug)]
#[command(name = "link-archiver")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/link-archiver/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Archive links from messages read on stdin (default)
    Watch(WatchArgs),
    /// List the available archival tools
    Tools,
    /// Show which tool the rules pick for a URL and MIME type
    SelectTool(SelectToolArgs),
    /// Validate the config and print the effective rules
    CheckConfig,
    /// Print the stored archive records of a post's URL
    Show(ShowArgs),
}

/// Options for `watch`.
///
/// Each input line is tab-separated, with the text always last:
/// `post_id [channel_id [user_id [root_id]]] text`.
/// A line reading `!reload` reloads the config file.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct WatchArgs {
    /// `SQLite` database for archive records (in-memory when absent)
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Directory for archived files (in-memory when absent)
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Ignore messages posted by this user id
    #[arg(long, value_name = "USER_ID")]
    pub bot_user: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SelectToolArgs {
    /// URL to classify
    pub url: String,

    /// MIME type of the URL's content
    #[arg(long, default_value = "text/html")]
    pub mime: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ShowArgs {
    /// Post id
    pub post_id: String,

    /// URL as it appeared in the post
    pub url: String,

    /// `SQLite` database holding the archive records
    #[arg(long, value_name = "PATH")]
    pub db: PathBuf,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["link-archiver"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.config.is_none());
        assert!(args.command.is_none());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["link-archiver", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["link-archiver", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args =
            Args::try_parse_from(["link-archiver", "tools", "--verbose", "--verbose"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["link-archiver", "-q"]).unwrap();
        assert!(args.quiet);

        let args = Args::try_parse_from(["link-archiver", "check-config", "--quiet"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["link-archiver", "--help"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let result = Args::try_parse_from(["link-archiver", "--invalid-flag"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_watch_options() {
        let args = Args::try_parse_from([
            "link-archiver",
            "watch",
            "--db",
            "archive.db",
            "--store-dir",
            "files",
            "--bot-user",
            "bot",
        ])
        .unwrap();
        let Some(Command::Watch(watch)) = args.command else {
            panic!("expected watch");
        };
        assert_eq!(watch.db, Some(PathBuf::from("archive.db")));
        assert_eq!(watch.store_dir, Some(PathBuf::from("files")));
        assert_eq!(watch.bot_user.as_deref(), Some("bot"));
    }

    #[test]
    fn test_cli_select_tool_defaults_mime() {
        let args =
            Args::try_parse_from(["link-archiver", "select-tool", "https://a.com/x"]).unwrap();
        let Some(Command::SelectTool(select)) = args.command else {
            panic!("expected select-tool");
        };
        assert_eq!(select.url, "https://a.com/x");
        assert_eq!(select.mime, "text/html");
    }

    #[test]
    fn test_cli_show_requires_db() {
        let result = Args::try_parse_from(["link-archiver", "show", "p1", "https://a.com"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_global_config_after_subcommand() {
        let args =
            Args::try_parse_from(["link-archiver", "tools", "--config", "/tmp/c.json"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.json")));
    }
}
