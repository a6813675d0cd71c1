//! Shared setup for pipeline scenarios: three mock backends and a builder
//! pre-wired with them.

use std::sync::Arc;

use hybrid_search::config::Config;
use hybrid_search::search::{BackendKind, DocumentStore, SearchOrchestratorBuilder, SearchOrchestrator};
use hybrid_search::test_utils::fixtures::sample_store;
use hybrid_search::test_utils::mock_backend::MockBackend;

pub struct Backends {
    pub keyword: Arc<MockBackend>,
    pub dense: Arc<MockBackend>,
    pub sparse: Arc<MockBackend>,
}

impl Backends {
    pub fn new(keyword: MockBackend, dense: MockBackend, sparse: MockBackend) -> Self {
        Self {
            keyword: Arc::new(keyword),
            dense: Arc::new(dense),
            sparse: Arc::new(sparse),
        }
    }

    pub fn returning(keyword: &[&str], dense: &[&str], sparse: &[&str]) -> Self {
        Self::new(
            MockBackend::returning(BackendKind::Keyword, keyword),
            MockBackend::returning(BackendKind::Dense, dense),
            MockBackend::returning(BackendKind::Sparse, sparse),
        )
    }

    /// Builder wired to these backends and the sample corpus metadata.
    pub fn builder(&self) -> SearchOrchestratorBuilder {
        self.builder_with_store(Arc::new(sample_store()))
    }

    pub fn builder_with_store(&self, store: Arc<DocumentStore>) -> SearchOrchestratorBuilder {
        SearchOrchestrator::builder()
            .keyword(self.keyword.clone())
            .dense(self.dense.clone(), self.dense.clone())
            .sparse(self.sparse.clone(), self.sparse.clone())
            .documents(store)
    }

    pub fn orchestrator(&self) -> SearchOrchestrator {
        self.builder().build().expect("orchestrator builds")
    }

    pub fn calls(&self) -> [usize; 3] {
        [self.keyword.calls(), self.dense.calls(), self.sparse.calls()]
    }
}

/// Default config with a short retrieval timeout.
pub fn config_with_timeout(timeout_ms: u64) -> Config {
    let mut config = Config::default();
    config.retrieval.timeout_ms = timeout_ms;
    config
}

pub fn ids(response: &hybrid_search::search::SearchResponse) -> Vec<&str> {
    response.results.iter().map(|r| r.doc_id.as_str()).collect()
}
