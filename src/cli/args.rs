//! Command line argument parsing for the pagesift CLI using clap.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// pagesift - late-interaction page retrieval over multi-vector embeddings
#[derive(Parser, Debug, Clone)]
#[command(name = "pagesift")]
#[command(about = "Build and query multi-vector page embedding indexes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct PageSiftArgs {
    /// Increase log output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Configuration file (JSON) with builder, retrieval and storage sections
    #[arg(short, long, env = "PAGESIFT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl PageSiftArgs {
    /// Get the effective verbosity level: 0 when quiet, 1 by default and one
    /// more for each `-v`.
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose.saturating_add(1)
        }
    }

    /// The log level for the effective verbosity.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbosity() {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build an index from pages with precomputed vectors
    Build(BuildArgs),

    /// Rank the pages of an index against a set of query vectors
    Search(SearchArgs),

    /// Show index statistics
    Stats(StatsArgs),

    /// Load an index with every integrity check
    Validate(ValidateArgs),
}

/// Arguments for building an index
#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// JSONL file with one page per line:
    /// {"file_path", "page_number", "image_file"?, "vectors": [[f32, ...], ...]}
    #[arg(value_name = "PAGES_FILE")]
    pub pages_file: PathBuf,

    /// Pages per encoder batch
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Leave out batches that fail to encode instead of aborting
    #[arg(long)]
    pub skip_failed_batches: bool,

    /// Encoder batches in flight at once (0 = one per CPU)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Checkpoint every encoded batch
    #[arg(long)]
    pub checkpoint: bool,

    /// Resume from the checkpoint of an interrupted build
    #[arg(long)]
    pub resume: bool,
}

/// Arguments for searching
#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// JSON file holding the query vectors as an array of arrays
    #[arg(long, value_name = "QUERY_FILE")]
    pub query_vectors: PathBuf,

    /// Maximum number of results to return
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Divide scores by the number of query vectors
    #[arg(long)]
    pub normalize: bool,
}

/// Arguments for index statistics
#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,
}

/// Arguments for index validation
#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,
}

/// Output formats for CLI
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command() {
        let args = PageSiftArgs::try_parse_from([
            "pagesift",
            "build",
            "/path/to/index",
            "pages.jsonl",
            "--batch-size",
            "16",
            "--skip-failed-batches",
            "--workers",
            "4",
        ])
        .unwrap();

        if let Command::Build(build_args) = args.command {
            assert_eq!(build_args.index_path, PathBuf::from("/path/to/index"));
            assert_eq!(build_args.pages_file, PathBuf::from("pages.jsonl"));
            assert_eq!(build_args.batch_size, Some(16));
            assert!(build_args.skip_failed_batches);
            assert_eq!(build_args.workers, Some(4));
            assert!(!build_args.resume);
        } else {
            panic!("Expected Build command");
        }
    }

    #[test]
    fn test_search_command() {
        let args = PageSiftArgs::try_parse_from([
            "pagesift",
            "search",
            "/path/to/index",
            "--query-vectors",
            "query.json",
            "--limit",
            "3",
            "--format",
            "json",
            "--pretty",
        ])
        .unwrap();

        assert_eq!(args.output_format, OutputFormat::Json);
        assert!(args.pretty);
        if let Command::Search(search_args) = args.command {
            assert_eq!(search_args.query_vectors, PathBuf::from("query.json"));
            assert_eq!(search_args.limit, Some(3));
            assert!(!search_args.normalize);
        } else {
            panic!("Expected Search command");
        }
    }

    #[test]
    fn test_verbosity() {
        let args = PageSiftArgs::try_parse_from(["pagesift", "stats", "idx"]).unwrap();
        assert_eq!(args.verbosity(), 1);
        assert_eq!(args.log_level(), log::LevelFilter::Warn);

        let args = PageSiftArgs::try_parse_from(["pagesift", "-v", "stats", "idx"]).unwrap();
        assert_eq!(args.verbosity(), 2);
        assert_eq!(args.log_level(), log::LevelFilter::Info);

        let args = PageSiftArgs::try_parse_from(["pagesift", "-vv", "stats", "idx"]).unwrap();
        assert_eq!(args.log_level(), log::LevelFilter::Debug);

        let args = PageSiftArgs::try_parse_from(["pagesift", "-vvv", "stats", "idx"]).unwrap();
        assert_eq!(args.verbosity(), 4);
        assert_eq!(args.log_level(), log::LevelFilter::Debug);

        let args = PageSiftArgs::try_parse_from(["pagesift", "-q", "-vv", "validate", "idx"]).unwrap();
        assert_eq!(args.verbosity(), 0);
        assert_eq!(args.log_level(), log::LevelFilter::Error);
    }

    #[test]
    fn test_search_requires_query_vectors() {
        assert!(PageSiftArgs::try_parse_from(["pagesift", "search", "idx"]).is_err());
    }
}
