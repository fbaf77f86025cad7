use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(author, version, about = "GitHub issue search monitor", long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file (falls back to $CONFIG_FILE).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log what would be notified without touching any sink or the cache.
    #[arg(long, action = ArgAction::SetTrue)]
    pub dry_run: bool,

    /// Use a JSON layer for logs (`--features json-logs`).
    #[arg(long, action = ArgAction::SetTrue)]
    pub json_logs: bool,

    /// Explicit log filter (e.g. "issuewatch=debug").
    #[arg(long, value_name = "FILTER")]
    pub log_filter: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
