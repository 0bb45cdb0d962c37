//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// pushdaemon - rate-limit aware webhook push scheduler
#[derive(Parser)]
#[command(
    name = "pd",
    about = "Push data feeds to rate-limited webhooks with per-feed backoff",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler until SIGINT/SIGTERM
    Run,

    /// Run a single iteration and exit
    Once,

    /// Show delivery state and next eligible time per feed
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Clear delivery state for one feed, or all feeds
    Reset {
        /// Feed id; omit to reset every feed
        task: Option<String>,
    },

    /// List registered feeds
    Feeds,
}

/// Output format for the status command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
