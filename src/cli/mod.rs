//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;
pub mod output;

/// Hybrid search over a JSON corpus: keyword, dense and sparse retrieval
/// fused with reciprocal rank fusion
#[derive(Parser, Debug)]
#[command(name = "hs")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit JSON on stdout and JSON logs on stderr
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (default: $HS_CONFIG, then ~/.config/hybrid-search/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search a corpus
    Search(commands::search::SearchArgs),

    /// Facet counts for a query, without reranking or caching
    Facets(commands::facets::FacetsArgs),

    /// Print the effective configuration
    Config(commands::config::ConfigArgs),
}
