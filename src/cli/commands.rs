//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Resumable, partitioned extraction from SQL databases
#[derive(Parser, Debug)]
#[command(name = "solidafy-sql-source")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Source configuration file (YAML)
    #[arg(short, long, global = true, default_value = "source.yaml")]
    pub config: PathBuf,

    /// State file (JSON)
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,

    /// Inline state JSON
    #[arg(long, global = true)]
    pub state_json: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Test connection to the database
    Check,

    /// List tables and their columns
    Discover,

    /// Show how configured streams would be partitioned, without reading
    Plan {
        /// Streams to plan (comma-separated labels, empty = all configured)
        #[arg(long)]
        streams: Option<String>,
    },

    /// Read configured streams
    Read {
        /// Streams to sync (comma-separated labels, empty = all configured)
        #[arg(long)]
        streams: Option<String>,
    },
}

impl Commands {
    /// Stream labels selected with `--streams`, if any
    pub fn selected_streams(&self) -> Option<Vec<String>> {
        match self {
            Self::Plan { streams } | Self::Read { streams } => streams.as_deref().map(|list| {
                list.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
            Self::Check | Self::Discover => None,
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
