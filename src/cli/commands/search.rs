//! hs search - Search a corpus
//!
//! Runs the full pipeline: keyword, dense and sparse retrieval, weighted
//! RRF fusion, optional reranking and facets.

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::cli::commands::CorpusArgs;
use crate::cli::output::{self, HumanLayout};
use crate::error::Result;
use crate::search::{HybridWeights, Query, SearchResponse};

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query (may be empty when filters are given)
    #[arg(default_value = "")]
    pub query: String,

    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Maximum number of results
    #[arg(long, short, default_value = "20")]
    pub limit: usize,

    /// Results to skip
    #[arg(long, default_value = "0")]
    pub offset: usize,

    /// Explicit weights as keyword,dense,sparse (e.g. 0.5,0.3,0.2)
    #[arg(long, short)]
    pub weights: Option<String>,

    /// Rerank the fused head with the term-overlap reranker
    #[arg(long, conflicts_with = "no_rerank")]
    pub rerank: bool,

    /// Skip reranking even when enabled in config
    #[arg(long)]
    pub no_rerank: bool,
}

impl SearchArgs {
    pub fn query(&self) -> Result<Query> {
        let filters = self.corpus.filters()?;
        let filters_only = self.query.trim().is_empty() && !filters.is_empty();

        let mut query = Query::new(&self.query)
            .with_limit(self.limit)
            .with_offset(self.offset)
            .with_filters(filters);
        if filters_only {
            query = query.allow_filters_only();
        }
        if let Some(ref spec) = self.weights {
            query = query.with_weights(HybridWeights::parse(spec)?);
        }
        if self.rerank {
            query = query.with_reranking(true);
        } else if self.no_rerank {
            query = query.with_reranking(false);
        }
        Ok(query)
    }
}

pub async fn run(ctx: &AppContext, args: &SearchArgs) -> Result<()> {
    let query = args.query()?;
    let orchestrator = ctx.orchestrator(&args.corpus.corpus)?;
    let response = orchestrator.search(query).await?;

    if ctx.json {
        return output::emit_json(&output::envelope(&response));
    }
    display_response(&args.query, &response);
    Ok(())
}

fn display_response(query: &str, response: &SearchResponse) {
    if response.results.is_empty() {
        println!("{} No results for '{}'", "!".yellow(), query.cyan());
        println!();
        println!("Try:");
        println!("  - Using different keywords");
        println!("  - Removing filters (--tags, --class, --min-quality, --from, --to)");
        return;
    }

    println!(
        "{} of {} results for '{}' ({} ms{})",
        response.results.len().to_string().bold(),
        response.total_matched,
        query.cyan(),
        response.took_ms,
        if response.cache_hit { ", cached" } else { "" }
    );
    for missing in &response.backends_unavailable {
        println!(
            "{} {} backend unavailable: {}",
            "!".yellow(),
            missing.backend.to_string().bold(),
            missing.reason
        );
    }
    if let Some(ref reason) = response.rerank_skip_reason {
        println!("{} rerank skipped: {reason}", "!".yellow());
    }
    println!();

    for result in &response.results {
        let rank = format!("{}.", result.fusion_rank);
        let sources: Vec<String> = result
            .breakdown
            .ranks
            .iter()
            .map(|(backend, rank)| format!("{backend}#{rank}"))
            .collect();

        println!("{:4} {}", rank.dimmed(), result.doc_id.bold());
        let rerank = result
            .rerank_score
            .map(|s| format!(", rerank: {s:.3}"))
            .unwrap_or_default();
        println!(
            "     score: {:.5}{}  [{}]",
            result.score,
            rerank,
            sources.join(" ").dimmed()
        );
        if let Some(ref snippet) = result.snippet {
            println!("     \"{}\"", snippet.render("[", "]").italic());
        }
        println!();
    }

    if let Some(ref decision) = response.weights {
        let w = &decision.weights;
        let mut layout = HumanLayout::new();
        layout.kv(
            "weights",
            &format!("keyword {:.2}, dense {:.2}, sparse {:.2}", w.keyword, w.dense, w.sparse),
        );
        if !decision.rules_fired.is_empty() {
            layout.kv("rules", &decision.rules_fired.join(", "));
        }
        output::emit_human(layout);
    }
    output::print_facets(&response.facets);
}
