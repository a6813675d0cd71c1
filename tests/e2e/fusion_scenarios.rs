//! E2E Scenario: weighted RRF through the full pipeline.

use hybrid_search::search::{BackendKind, HybridWeights, Query};
use hybrid_search::test_utils::logging::TestLogger;

use super::fixture::{Backends, ids};

#[tokio::test]
async fn test_scenario_exact_fused_score() {
    let log = TestLogger::new("test_scenario_exact_fused_score");
    let backends = Backends::returning(&["A", "B", "C"], &["B", "A", "D"], &["A", "C", "B"]);
    let orchestrator = backends.orchestrator();

    let weights = HybridWeights::explicit(0.3, 0.4, 0.3).unwrap();
    let query = Query::new("neural networks").with_weights(weights);
    log.log_input("query", &query);

    let response = orchestrator.search(query).await.unwrap();

    let expected = 0.3 / (60.0 + 1.0) + 0.4 / (60.0 + 2.0) + 0.3 / (60.0 + 1.0);
    log.log_expected(&expected);
    let a = response.results.iter().find(|r| r.doc_id == "A").unwrap();
    log.log_actual(&a.score);

    assert_eq!(a.score, expected);
    assert_eq!(a.fusion_rank, 1);
    assert_eq!(a.breakdown.ranks[&BackendKind::Keyword], 1);
    assert_eq!(a.breakdown.ranks[&BackendKind::Dense], 2);
    assert_eq!(a.breakdown.ranks[&BackendKind::Sparse], 1);
    assert_eq!(a.breakdown.contributions[&BackendKind::Dense], 0.4 / 62.0);
    assert_eq!(response.total_matched, 4);
    log.pass();
}

#[tokio::test]
async fn test_scenario_keyword_only_weights_follow_keyword_order() {
    let backends = Backends::returning(&["C", "A", "B"], &["A", "D"], &["B", "E"]);
    let orchestrator = backends.orchestrator();

    let query = Query::new("anything at all")
        .with_weights(HybridWeights::explicit(1.0, 0.0, 0.0).unwrap());
    let response = orchestrator.search(query).await.unwrap();

    assert_eq!(ids(&response), vec!["C", "A", "B"]);
    assert!(
        response
            .results
            .iter()
            .all(|r| r.breakdown.contributions.keys().all(|b| *b == BackendKind::Keyword))
    );
    let decision = response.weights.unwrap();
    assert!(decision.explicit);
    assert!(decision.rules_fired.is_empty());
}

#[tokio::test]
async fn test_absent_document_gets_single_term() {
    let backends = Backends::returning(&["A"], &["B"], &["B"]);
    let orchestrator = backends.orchestrator();

    let query = Query::new("a longer query about things")
        .with_weights(HybridWeights::explicit(0.3, 0.4, 0.3).unwrap());
    let response = orchestrator.search(query).await.unwrap();

    let a = response.results.iter().find(|r| r.doc_id == "A").unwrap();
    assert_eq!(a.score, 0.3 / 61.0);
    assert_eq!(a.breakdown.contributions.len(), 1);
}

#[tokio::test]
async fn test_adaptive_weights_for_short_query() {
    let backends = Backends::returning(&["A"], &["B"], &["C"]);
    let orchestrator = backends.orchestrator();

    let response = orchestrator.search(Query::new("RRF")).await.unwrap();
    let decision = response.weights.as_ref().unwrap();

    assert!(!decision.explicit);
    assert!(!decision.rules_fired.is_empty());
    assert!((decision.weights.keyword - 0.5).abs() < 1e-9);
    assert!((decision.weights.dense - 0.3).abs() < 1e-9);
    assert!((decision.weights.sparse - 0.2).abs() < 1e-9);
    // keyword now outweighs dense at equal rank
    assert_eq!(ids(&response)[0], "A");
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let backends = Backends::returning(&["x", "y"], &["y", "x"], &[]);
    let mut config = hybrid_search::config::Config::default();
    config.cache.enabled = false;
    let orchestrator = backends.builder().config(config).build().unwrap();

    let query = Query::new("tie break check")
        .with_weights(HybridWeights::explicit(0.5, 0.5, 0.0).unwrap());
    let first = orchestrator.search(query.clone()).await.unwrap();
    let second = orchestrator.search(query).await.unwrap();

    // equal scores and equal best rank: id decides
    assert_eq!(ids(&first), vec!["x", "y"]);
    assert_eq!(first.results, second.results);
}

#[tokio::test]
async fn test_pagination_windows_fused_order() {
    let keyword: Vec<String> = (0..30).map(|i| format!("doc-{i:02}")).collect();
    let keyword: Vec<&str> = keyword.iter().map(String::as_str).collect();
    let backends = Backends::returning(&keyword, &[], &[]);
    let orchestrator = backends.orchestrator();

    let page = orchestrator
        .search(Query::new("paged query").with_limit(10).with_offset(10))
        .await
        .unwrap();

    assert_eq!(page.total_matched, 30);
    assert_eq!(page.results.len(), 10);
    assert_eq!(page.results[0].doc_id, "doc-10");
    assert_eq!(page.results[0].fusion_rank, 11);
}
