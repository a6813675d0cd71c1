//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - `run()` function to execute the command

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Args;

use crate::app::AppContext;
use crate::cli::Commands;
use crate::error::{Result, SearchError};
use crate::search::{DateRange, SearchFilters};

pub mod config;
pub mod facets;
pub mod search;

/// Dispatch a command to its handler
pub async fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Search(args) => search::run(ctx, args).await,
        Commands::Facets(args) => facets::run(ctx, args).await,
        Commands::Config(args) => config::run(ctx, args),
    }
}

/// Corpus and filter flags shared by `search` and `facets`.
#[derive(Args, Debug, Clone)]
pub struct CorpusArgs {
    /// JSON corpus: an array of {id, title, body, tags, classifications, quality, date}
    #[arg(long, short = 'c')]
    pub corpus: PathBuf,

    /// Tag filters, field=value pairs (comma-separated; OR within a field)
    #[arg(long, short)]
    pub tags: Option<String>,

    /// Minimum quality score (0.0-1.0)
    #[arg(long)]
    pub min_quality: Option<f64>,

    /// Accepted classification codes (repeatable)
    #[arg(long = "class", value_delimiter = ',')]
    pub classifications: Vec<String>,

    /// Earliest publication date (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub from: Option<String>,

    /// Latest publication date (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub to: Option<String>,
}

impl CorpusArgs {
    pub fn filters(&self) -> Result<SearchFilters> {
        let mut filters = SearchFilters::new();

        if let Some(ref spec) = self.tags {
            filters.tags = SearchFilters::parse_tags(spec)?;
        }
        if let Some(min) = self.min_quality {
            filters = filters.min_quality(min);
        }
        for class in &self.classifications {
            filters = filters.classification(class.trim());
        }

        let from = self.from.as_deref().map(parse_date).transpose()?;
        let to = self.to.as_deref().map(parse_date).transpose()?;
        if from.is_some() || to.is_some() {
            filters = filters.date_range(DateRange::new(from, to)?);
        }

        filters.validate()?;
        Ok(filters)
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|err| {
        SearchError::InvalidFilter(format!("invalid date '{raw}' (expected YYYY-MM-DD): {err}"))
    })
}
