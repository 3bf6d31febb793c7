//! Command-line interface definitions for dupevault.
//!
//! This module defines all CLI arguments, subcommands, and options using the
//! clap derive API. Global options (verbosity, index and config locations)
//! apply to every subcommand.
//!
//! # Example
//!
//! ```bash
//! # Scan a directory and keep the results in the index
//! dupevault scan ~/Pictures
//!
//! # Only look at photos, hash everything
//! dupevault scan ~/Pictures --ext jpg --ext png --no-quick-scan
//!
//! # Move every duplicate into quarantine without prompting
//! dupevault dedupe --root ~/Pictures -y
//!
//! # Put one file back
//! dupevault quarantine restore 1/photo.jpg
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Duplicate file finder with a persistent checksum index.
///
/// dupevault hashes files with BLAKE3, remembers what it found in a local
/// index, and moves duplicates into a quarantine folder instead of deleting
/// them.
#[derive(Debug, Parser)]
#[command(name = "dupevault")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Index database location
    #[arg(long, value_name = "PATH", global = true, env = "DUPEVAULT_DB")]
    pub db: Option<PathBuf>,

    /// Configuration file to read instead of the default
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a directory for duplicate files
    Scan(ScanArgs),
    /// Print duplicate groups stored by earlier scans
    Groups(GroupsArgs),
    /// Quarantine every duplicate, keeping one file per group
    Dedupe(DedupeArgs),
    /// Inspect or restore quarantined files
    #[command(subcommand)]
    Quarantine(QuarantineCommand),
    /// Forget stored scan results
    Clear(ClearArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory to scan (defaults to the current directory)
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Only consider files with this extension (repeatable)
    #[arg(short, long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Hash every file, even those whose size is unique
    #[arg(long)]
    pub no_quick_scan: bool,

    /// Number of files above which quick scan prunes by size
    #[arg(long, value_name = "N")]
    pub threshold: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Number of hashing threads
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub hash_threads: Option<u16>,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Include zero-byte files
    #[arg(long)]
    pub include_empty: bool,
}

/// Arguments for the groups subcommand.
#[derive(Debug, Args)]
pub struct GroupsArgs {
    /// Only show files under this directory
    #[arg(long, value_name = "PATH")]
    pub root: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the dedupe subcommand.
#[derive(Debug, Args)]
pub struct DedupeArgs {
    /// Only handle groups under this directory
    #[arg(long, value_name = "PATH")]
    pub root: Option<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Quarantine subcommands.
#[derive(Debug, Subcommand)]
pub enum QuarantineCommand {
    /// List quarantined files grouped by content
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Move a quarantined file into the restore directory
    Restore {
        /// File inside the quarantine directory (absolute or relative to it)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Open the quarantine directory in the file manager
    Reveal,
}

/// Arguments for the clear subcommand.
#[derive(Debug, Args)]
pub struct ClearArgs {
    /// Only forget files under this directory
    #[arg(long, value_name = "PATH")]
    pub root: Option<PathBuf>,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
