//! Command line argument parsing for the Taxis CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Taxis - faceted text index over JSON-lines records
#[derive(Parser, Debug, Clone)]
#[command(name = "taxis")]
#[command(about = "Faceted text index over JSON-lines records")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct TaxisArgs {
    /// Verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only report errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Indexer configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE", env = "TAXIS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl TaxisArgs {
    /// Effective verbosity: 0 quiet, 1 default, 2 verbose, 3 debug.
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose.saturating_add(1)
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Index the records of a JSON-lines file
    Index(IndexArgs),

    /// Search an index
    Search(SearchArgs),

    /// Suggest values of a field
    Suggest(SuggestArgs),

    /// Show facet label counts or the facet configuration
    Facets(FacetsArgs),

    /// Show term vectors of a field
    #[command(name = "term-vectors")]
    TermVectors(TermVectorsArgs),

    /// Show index statistics
    Stats(StatsArgs),
}

/// Arguments for indexing records
#[derive(Parser, Debug, Clone)]
pub struct IndexArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Record file (JSON lines)
    #[arg(value_name = "RECORDS")]
    pub records: PathBuf,

    /// Fields indexed as facets (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub facet: Vec<String>,

    /// Facet fields whose values are `/`-separated paths (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub taxonomy: Vec<String>,

    /// Fields feeding the suggestion lookups (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub suggest: Vec<String>,

    /// Sortable fields (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub sortable: Vec<String>,

    /// Don't commit after indexing
    #[arg(long)]
    pub no_commit: bool,
}

/// Arguments for searching
#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Record file the hits are loaded from
    #[arg(value_name = "RECORDS")]
    pub records: PathBuf,

    /// Query string; all documents when omitted
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    /// Restrict hits to a kind
    #[arg(short, long)]
    pub kind: Option<String>,

    /// Maximum number of hits to return
    #[arg(short, long, default_value = "10")]
    pub top: usize,

    /// Number of hits to skip
    #[arg(short, long, default_value = "0")]
    pub skip: usize,

    /// Labels returned per facet dimension
    #[arg(long, default_value = "10")]
    pub fdim: usize,

    /// Drill down on `dim/value` (repeatable)
    #[arg(long = "drill")]
    pub drill: Vec<String>,

    /// Count drilled dimensions sideways
    #[arg(long)]
    pub sideway: bool,

    /// Sort on a field: `^field` ascending, `$field` descending (repeatable)
    #[arg(long)]
    pub order: Vec<String>,
}

/// Arguments for suggestions
#[derive(Parser, Debug, Clone)]
pub struct SuggestArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Text to complete
    #[arg(value_name = "KEY")]
    pub key: String,

    /// Field to suggest from; every field when omitted
    #[arg(long)]
    pub field: Option<String>,

    /// Maximum number of suggestions
    #[arg(short, long, default_value = "10")]
    pub max: usize,
}

/// Arguments for facet inspection
#[derive(Parser, Debug, Clone)]
pub struct FacetsArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Dimension to count; prints the facet configuration when omitted
    #[arg(value_name = "DIM")]
    pub dim: Option<String>,
}

/// Arguments for term vectors
#[derive(Parser, Debug, Clone)]
pub struct TermVectorsArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Kind of the scanned documents
    #[arg(value_name = "KIND")]
    pub kind: String,

    /// Field whose terms are collected
    #[arg(value_name = "FIELD")]
    pub field: String,

    /// Only scan documents with `field=value` (repeatable)
    #[arg(long)]
    pub filter: Vec<String>,

    /// Break the terms down by each value of this field
    #[arg(long, conflicts_with = "filter")]
    pub conditional: Option<String>,
}

/// Arguments for statistics
#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text
    Human,
    /// JSON
    Json,
}
