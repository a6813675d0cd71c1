//! Application context shared by CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;
use crate::search::{
    Bm25Index, DocumentStore, HashEmbedder, SearchOrchestrator, SparseIndex, TermOverlapReranker,
    TermWeightEncoder, VectorIndex,
};

/// Effective config plus output mode for one CLI invocation.
pub struct AppContext {
    pub config: Config,
    pub config_path: Option<PathBuf>,
    pub json: bool,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref())?;
        Ok(Self {
            config,
            config_path: cli.config.clone(),
            json: cli.json,
        })
    }

    pub const fn with_config(config: Config, json: bool) -> Self {
        Self {
            config,
            config_path: None,
            json,
        }
    }

    /// Load a JSON corpus and index it with all three reference backends.
    pub fn orchestrator(&self, corpus: &Path) -> Result<SearchOrchestrator> {
        let store = Arc::new(DocumentStore::load_json(corpus)?);
        info!(path = %corpus.display(), documents = store.len(), "corpus loaded");
        self.orchestrator_for(store)
    }

    pub fn orchestrator_for(&self, store: Arc<DocumentStore>) -> Result<SearchOrchestrator> {
        let bm25 = Bm25Index::build(&store)?;

        let embedder = HashEmbedder::default();
        let vectors = VectorIndex::build(&store, &embedder);

        let encoder = TermWeightEncoder::default();
        let sparse = SparseIndex::build(&store, &encoder);

        debug!(documents = store.len(), "indexes built");

        SearchOrchestrator::builder()
            .config(self.config.clone())
            .keyword(Arc::new(bm25))
            .dense(Arc::new(embedder), Arc::new(vectors))
            .sparse(Arc::new(encoder), Arc::new(sparse))
            .documents(store)
            .reranker(Arc::new(TermOverlapReranker))
            .build()
    }
}
