use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use coy_core::export::ExportFormat;

#[derive(Parser)]
#[command(name = "coy")]
#[command(about = "Inspect relationship gating and replay conversation timelines")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Sync configuration file (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the relationship resolution table for every status pair
    Table {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve the view for one status pair
    Resolve {
        /// My status towards them (`unknown` while loading)
        mine: String,
        /// Their status towards me (`unknown` while loading)
        theirs: String,
        /// Result of an authoritative friendship check
        #[arg(long, value_name = "BOOL")]
        known_friends: Option<bool>,
        /// Treat the pair as blocked
        #[arg(long)]
        blocked: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what the add/restore action would do for a status pair
    Intent {
        mine: String,
        theirs: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay a scripted conversation against in-memory stores
    Replay {
        /// Replay script (JSON)
        script: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Also export the final timeline into this directory, in `--format`
        #[arg(long, value_name = "DIR")]
        export_dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl From<OutputFormat> for ExportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => Self::Text,
            OutputFormat::Json => Self::Json,
        }
    }
}
