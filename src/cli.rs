//! Command-line interface definitions.
//!
//! The CLI is a thin shell over the library façade: `analyze` runs the
//! engine, `signatures` manages the store. Output is JSON or a plain table;
//! richer renderers live outside this crate.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "binsniff",
    about = "Detect open-source components embedded in binaries",
    version
)]
pub struct Args {
    /// Signature store path (defaults to the per-user data directory)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Emit JSON instead of the table view
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze a file or directory
    Analyze {
        /// File or directory to analyze
        path: PathBuf,

        /// Minimum confidence for a reported match
        #[arg(long, default_value_t = 0.5)]
        threshold: f32,

        /// Disable the TLSH fuzzy matcher
        #[arg(long)]
        no_fuzzy: bool,

        /// TLSH distance cutoff
        #[arg(long, default_value_t = 70)]
        fuzzy_threshold: u32,

        /// Minimum distinct pattern hits per component
        #[arg(long, default_value_t = 1)]
        min_matches: usize,

        /// Attach MD5/SHA1/SHA256 of each input
        #[arg(long)]
        hashes: bool,

        /// Attach TLSH/ssdeep of each input
        #[arg(long)]
        fuzzy_hashes: bool,

        /// Skip files larger than this many bytes
        #[arg(long)]
        max_size: Option<u64>,

        /// Per-file timeout in seconds
        #[arg(long, default_value_t = 60)]
        timeout: u64,

        /// Keep only the top N matches per file
        #[arg(long)]
        top: Option<usize>,

        /// Only analyze files matching these glob patterns
        #[arg(long = "pattern")]
        patterns: Vec<String>,

        /// Worker threads for directory analysis
        #[arg(long)]
        workers: Option<usize>,

        /// Disable the native-vs-mobile context filter
        #[arg(long)]
        no_context_filter: bool,
    },

    /// Signature store management
    #[command(subcommand)]
    Signatures(SignaturesCommand),
}

#[derive(Debug, Subcommand)]
pub enum SignaturesCommand {
    /// Import signature JSON files (idempotent)
    Import {
        /// Signature files or directories of .json files
        paths: Vec<PathBuf>,
    },
    /// Print store summary
    Status,
    /// Rebuild the pattern indices from the pattern table
    Reindex,
}
