//! E2E Scenario: response cache behaviour across requests.

use std::sync::Arc;
use std::time::Duration;

use hybrid_search::config::Config;
use hybrid_search::search::{HybridWeights, Query, ResultCache, SearchFilters};
use hybrid_search::test_utils::logging::TestLogger;

use super::fixture::Backends;

#[tokio::test]
async fn test_cache_idempotence_within_ttl() {
    let log = TestLogger::new("test_cache_idempotence_within_ttl");
    let backends = Backends::returning(&["rrf-paper", "bm25-notes"], &["splade"], &["rrf-paper"]);
    let orchestrator = backends.orchestrator();

    let query = Query::new("rank fusion")
        .with_filters(SearchFilters::new().min_quality(0.5))
        .with_weights(HybridWeights::explicit(0.4, 0.4, 0.2).unwrap());

    let first = orchestrator.search(query.clone()).await.unwrap();
    log.log_stage("first", &format!("calls={:?}", backends.calls()));
    let second = orchestrator.search(query).await.unwrap();
    log.log_stage("second", &format!("calls={:?}", backends.calls()));

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.results, second.results);
    assert_eq!(first.facets, second.facets);
    assert_eq!(backends.calls(), [1, 1, 1]);
    assert_eq!(orchestrator.cache().stats().hits, 1);
    log.pass();
}

#[tokio::test]
async fn test_whitespace_variants_share_an_entry() {
    let backends = Backends::returning(&["rrf-paper"], &[], &[]);
    let orchestrator = backends.orchestrator();

    orchestrator.search(Query::new("rank fusion")).await.unwrap();
    let again = orchestrator
        .search(Query::new("  rank \t fusion "))
        .await
        .unwrap();

    assert!(again.cache_hit);
    assert_eq!(backends.calls(), [1, 1, 1]);
}

#[tokio::test]
async fn test_different_page_is_a_miss() {
    let backends = Backends::returning(&["rrf-paper", "bm25-notes"], &[], &[]);
    let orchestrator = backends.orchestrator();

    orchestrator
        .search(Query::new("paging").with_limit(1))
        .await
        .unwrap();
    let next = orchestrator
        .search(Query::new("paging").with_limit(1).with_offset(1))
        .await
        .unwrap();

    assert!(!next.cache_hit);
    assert_eq!(next.results[0].doc_id, "bm25-notes");
    assert_eq!(backends.calls()[0], 2);
}

#[tokio::test]
async fn test_expired_entries_are_recomputed() {
    let backends = Backends::returning(&["rrf-paper"], &[], &[]);
    let cache = Arc::new(ResultCache::new(Duration::from_millis(20), 100));
    let orchestrator = backends.builder().cache(cache.clone()).build().unwrap();

    orchestrator.search(Query::new("ttl")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    let again = orchestrator.search(Query::new("ttl")).await.unwrap();

    assert!(!again.cache_hit);
    assert_eq!(backends.calls()[0], 2);
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test]
async fn test_disabled_cache_always_runs_pipeline() {
    let backends = Backends::returning(&["rrf-paper"], &[], &[]);
    let mut config = Config::default();
    config.cache.enabled = false;
    let orchestrator = backends.builder().config(config).build().unwrap();

    for _ in 0..3 {
        let response = orchestrator.search(Query::new("nocache")).await.unwrap();
        assert!(!response.cache_hit);
    }
    assert_eq!(backends.calls()[0], 3);
}

#[tokio::test]
async fn test_concurrent_requests_share_cache_safely() {
    let backends = Backends::returning(&["rrf-paper", "bm25-notes"], &["splade"], &[]);
    let orchestrator = Arc::new(backends.orchestrator());

    let mut handles = Vec::new();
    for i in 0..8 {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            let text = if i % 2 == 0 { "even query" } else { "odd query" };
            orchestrator.search(Query::new(text)).await
        }));
    }

    let mut responses = Vec::new();
    for handle in handles {
        responses.push(handle.await.unwrap().unwrap());
    }

    let even: Vec<_> = responses.iter().step_by(2).map(|r| &r.results).collect();
    assert!(even.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(orchestrator.cache().len(), 2);
}
