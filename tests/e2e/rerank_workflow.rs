//! E2E Scenario: reranking the fused head.

use std::sync::Arc;

use hybrid_search::config::Config;
use hybrid_search::search::{DocumentStore, Query};
use hybrid_search::test_utils::fixtures::document;
use hybrid_search::test_utils::logging::TestLogger;
use hybrid_search::test_utils::mock_backend::MockReranker;

use super::fixture::{Backends, ids};

fn numbered(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("doc-{i:04}")).collect()
}

fn store_for(doc_ids: &[String]) -> Arc<DocumentStore> {
    Arc::new(DocumentStore::from_documents(doc_ids.iter().map(|id| {
        document(id, id, "generic body text", &["bulk"], &["bulk"], 0.5, None)
    })))
}

#[tokio::test]
async fn test_rerank_bound_on_large_candidate_set() {
    let log = TestLogger::new("test_rerank_bound_on_large_candidate_set");
    let doc_ids = numbered(1000);
    let refs: Vec<&str> = doc_ids.iter().map(String::as_str).collect();
    let backends = Backends::returning(&refs, &[], &[]);

    let mut config = Config::default();
    config.retrieval.per_backend_k = 2000;
    config.rerank.top_n = 100;
    config.rerank.batch_size = 32;

    let reranker = Arc::new(MockReranker::with_scores(&[]));
    let orchestrator = backends
        .builder_with_store(store_for(&doc_ids))
        .config(config)
        .reranker(reranker.clone())
        .build()
        .unwrap();

    let response = orchestrator
        .search(Query::new("bulk rerank").with_reranking(true))
        .await
        .unwrap();
    log.log_actual(&(reranker.scored(), reranker.max_batch()));

    assert_eq!(response.total_matched, 1000);
    assert!(response.rerank_applied);
    assert_eq!(reranker.scored(), 100);
    assert!(reranker.max_batch() <= 32);
    log.pass();
}

#[tokio::test]
async fn test_rerank_ties_keep_fusion_order() {
    let backends = Backends::returning(&["rrf-paper", "bm25-notes", "splade"], &[], &[]);
    let reranker = Arc::new(MockReranker::with_scores(&[
        ("rrf-paper", 0.5),
        ("bm25-notes", 0.5),
        ("splade", 0.9),
    ]));
    let orchestrator = backends.builder().reranker(reranker).build().unwrap();

    let response = orchestrator
        .search(Query::new("ranking").with_reranking(true))
        .await
        .unwrap();

    assert_eq!(ids(&response), vec!["splade", "rrf-paper", "bm25-notes"]);
    assert_eq!(response.results[1].fusion_rank, 1);
}

#[tokio::test]
async fn test_failing_reranker_falls_back_to_fused_order() {
    let backends = Backends::returning(&["rrf-paper", "bm25-notes"], &[], &[]);
    let orchestrator = backends
        .builder()
        .reranker(Arc::new(MockReranker::failing("model not loaded")))
        .build()
        .unwrap();

    let response = orchestrator
        .search(Query::new("ranking").with_reranking(true))
        .await
        .unwrap();

    assert!(response.rerank_skipped);
    assert!(!response.rerank_applied);
    assert!(
        response
            .rerank_skip_reason
            .as_deref()
            .unwrap()
            .contains("model not loaded")
    );
    assert_eq!(ids(&response), vec!["rrf-paper", "bm25-notes"]);
    assert!(response.results.iter().all(|r| r.rerank_score.is_none()));
}

#[tokio::test]
async fn test_rerank_enabled_by_config() {
    let backends = Backends::returning(&["rrf-paper", "bm25-notes"], &[], &[]);
    let reranker = Arc::new(MockReranker::with_scores(&[("bm25-notes", 1.0)]));
    let mut config = Config::default();
    config.rerank.enabled = true;
    let orchestrator = backends
        .builder()
        .config(config)
        .reranker(reranker.clone())
        .build()
        .unwrap();

    let default_on = orchestrator.search(Query::new("ranking")).await.unwrap();
    assert!(default_on.rerank_applied);
    assert_eq!(ids(&default_on)[0], "bm25-notes");

    let forced_off = orchestrator
        .search(Query::new("ranking").with_reranking(false))
        .await
        .unwrap();
    assert!(!forced_off.rerank_applied);
    assert!(!forced_off.rerank_skipped);
    assert_eq!(ids(&forced_off)[0], "rrf-paper");
    assert_eq!(reranker.calls(), 1);
}
