use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "refactor-sight",
    version,
    about = "Process-metrics sampler for refactored and stable files of a git history"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Pretty-print the summary JSON (default: compact)
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,
}

/// Tracking overrides shared by `scan` and `replay`.
#[derive(Args, Debug, Default, Clone)]
pub struct TrackingArgs {
    /// Stop after this commit (full id or prefix)
    #[arg(long)]
    pub last_commit: Option<String>,

    /// Comma-separated stability thresholds, e.g. 5,10,15
    #[arg(long, value_delimiter = ',')]
    pub thresholds: Option<Vec<u64>>,

    /// Comma-separated extensions of tracked files, e.g. java,kt
    #[arg(long, value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Write samples as NDJSON to this file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Log the full history of one file (follows renames)
    #[arg(long)]
    pub watch: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Walk a git repository and emit refactoring and stable samples
    Scan {
        /// Repository directory
        #[arg(short, long, default_value = ".")]
        dir: String,

        /// Branch or revision to walk
        #[arg(short, long, default_value = "HEAD")]
        branch: String,

        /// Precomputed refactoring report (RefactoringMiner JSON)
        #[arg(long)]
        refactorings: Option<String>,

        /// Store the source of each stable sample under this directory
        #[arg(long)]
        store_sources: Option<String>,

        /// Per-commit detection timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        #[command(flatten)]
        tracking: TrackingArgs,
    },

    /// Run the tracker over an NDJSON commit stream (one commit per line)
    Replay {
        /// Input file (default: stdin)
        #[arg(short, long)]
        input: Option<String>,

        #[command(flatten)]
        tracking: TrackingArgs,
    },

    /// Check git availability and show the effective configuration
    Doctor,

    /// Generate a default config file
    Init {
        /// Target path (default: ~/.config/refactor-sight/config.toml)
        #[arg(long)]
        path: Option<std::path::PathBuf>,
    },
}
