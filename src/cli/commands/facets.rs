//! hs facets - Facet counts for a query

use clap::Args;

use crate::app::AppContext;
use crate::cli::commands::CorpusArgs;
use crate::cli::output;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct FacetsArgs {
    /// Search query (empty counts every document matching the filters)
    #[arg(default_value = "")]
    pub query: String,

    #[command(flatten)]
    pub corpus: CorpusArgs,
}

pub async fn run(ctx: &AppContext, args: &FacetsArgs) -> Result<()> {
    let filters = args.corpus.filters()?;
    let orchestrator = ctx.orchestrator(&args.corpus.corpus)?;
    let facets = orchestrator.get_facets(&args.query, &filters).await?;

    if ctx.json {
        return output::emit_json(&output::envelope(&facets));
    }
    output::print_facets(&facets);
    Ok(())
}
