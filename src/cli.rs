//! CLI mode implementation
//!
//! Provides command-line access to the same operations the MCP tools expose.

use crate::metrics::{DataType, Level, Period};
use crate::service::ListFilter;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of search results
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Largest number of search results a single request may ask for
pub const MAX_SEARCH_LIMIT: usize = 200;

/// insights-metrics CLI
#[derive(Parser, Debug)]
#[command(name = "insights-metrics")]
#[command(about = "Analytics metric reference lookup and fuzzy search", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output (no short flag to avoid conflicts)
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Path of the persisted metrics JSON file
    #[arg(long = "data", env = "METRICS_DATA_PATH", global = true)]
    pub data_path: Option<PathBuf>,

    /// Path of the markdown reference document
    #[arg(long = "document", env = "METRICS_DOCUMENT_PATH", global = true)]
    pub document_path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the MCP server on stdio (the default without arguments)
    Serve(ServeArgs),
    /// List metrics with their level, periods and data type
    List(ListArgs),
    /// Show the full definition of one metric
    Get(GetArgs),
    /// Fuzzy-search metrics by name, description, tags or level
    Search(SearchArgs),
    /// Print only the names of the best fuzzy matches
    Suggest(SearchArgs),
    /// Re-extract metrics from the reference document and print a summary
    Refresh(RefreshArgs),
    /// List every distinct tag
    Tags,
    /// List every level in use
    Levels,
    /// List every data type in use
    DataTypes,
}

/// Server mode arguments
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Re-extract metrics from the reference document before serving
    #[arg(long)]
    pub rebuild: bool,
}

/// List filters; all of them must hold
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only metrics at this level (top, item, media, monetization, short-form, story)
    #[arg(long)]
    pub level: Option<Level>,

    /// Only metrics of this data type (Integer, Float, JSON, String)
    #[arg(long)]
    pub data_type: Option<DataType>,

    /// Only deprecated (true) or only current (false) metrics
    #[arg(long)]
    pub deprecated: Option<bool>,

    /// Only metrics reported over any of these periods (comma separated)
    #[arg(long = "period", value_delimiter = ',')]
    pub periods: Vec<Period>,

    /// Only metrics carrying any of these tags (comma separated)
    #[arg(long = "tag", value_delimiter = ',')]
    pub tags: Vec<String>,
}

impl ListArgs {
    pub fn filter(&self) -> ListFilter {
        ListFilter {
            level: self.level,
            data_type: self.data_type,
            deprecated: self.deprecated,
            periods: self.periods.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Refresh arguments
#[derive(Args, Debug, Clone, Default)]
pub struct RefreshArgs {
    /// Date stamped into the version instead of today (YYYY-MM-DD)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

/// Get tool arguments
#[derive(Args, JsonSchema, Deserialize, Serialize, Clone, Debug)]
pub struct GetArgs {
    /// Exact metric name
    #[arg(short = 'n', long)]
    #[schemars(description = "The exact name of the metric to retrieve")]
    pub name: String,
}

/// Search tool arguments
#[derive(Args, JsonSchema, Deserialize, Serialize, Clone, Debug)]
pub struct SearchArgs {
    /// Search query (typos tolerated)
    #[arg(short = 'q', long)]
    #[schemars(description = "Search query")]
    pub q: String,

    /// Maximum number of results (default 20, max 200)
    #[arg(short = 'l', long)]
    #[schemars(description = "Maximum number of results (default 20, max 200)")]
    pub limit: Option<usize>,
}

impl SearchArgs {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT)
    }
}
