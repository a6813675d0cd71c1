//! E2E Scenario: partial and total backend failure.

use std::time::{Duration, Instant};

use hybrid_search::error::SearchError;
use hybrid_search::search::{BackendKind, HybridWeights, Query};
use hybrid_search::test_utils::logging::TestLogger;
use hybrid_search::test_utils::mock_backend::{MockBackend, MockBehavior};

use super::fixture::{Backends, config_with_timeout, ids};

#[tokio::test]
async fn test_one_failed_backend_renormalizes_the_rest() {
    let log = TestLogger::new("test_one_failed_backend_renormalizes_the_rest");
    let backends = Backends::new(
        MockBackend::returning(BackendKind::Keyword, &["A", "B"]),
        MockBackend::returning(BackendKind::Dense, &["B", "C"]),
        MockBackend::failing(BackendKind::Sparse, "index offline"),
    );
    let orchestrator = backends.orchestrator();

    let response = orchestrator
        .search(Query::new("what is reciprocal rank fusion"))
        .await
        .unwrap();
    let decision = response.weights.clone().unwrap();
    log.log_actual(&decision);

    assert_eq!(decision.weights.sparse, 0.0);
    assert!((decision.weights.keyword + decision.weights.dense - 1.0).abs() < 1e-9);
    assert_eq!(decision.zeroed, vec![BackendKind::Sparse]);
    assert_eq!(response.backends_used, vec![BackendKind::Keyword, BackendKind::Dense]);
    assert_eq!(response.backends_unavailable.len(), 1);
    assert_eq!(response.backends_unavailable[0].backend, BackendKind::Sparse);
    assert!(response.backends_unavailable[0].reason.contains("index offline"));
    assert_eq!(ids(&response)[0], "B");
    log.pass();
}

#[tokio::test]
async fn test_explicit_weights_lose_failed_backend() {
    let backends = Backends::new(
        MockBackend::failing(BackendKind::Keyword, "down"),
        MockBackend::returning(BackendKind::Dense, &["A"]),
        MockBackend::returning(BackendKind::Sparse, &["B"]),
    );
    let orchestrator = backends.orchestrator();

    let query = Query::new("explicit weights")
        .with_weights(HybridWeights::explicit(0.5, 0.25, 0.25).unwrap());
    let response = orchestrator.search(query).await.unwrap();
    let weights = response.weights.unwrap().weights;

    assert_eq!(weights.keyword, 0.0);
    assert!((weights.dense - 0.5).abs() < 1e-9);
    assert!((weights.sparse - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_slow_backend_times_out_without_failing_search() {
    let backends = Backends::new(
        MockBackend::returning(BackendKind::Keyword, &["A"]),
        MockBackend::hanging(BackendKind::Dense),
        MockBackend::new(
            BackendKind::Sparse,
            MockBehavior::Delay(Duration::from_millis(5), vec!["B".into()]),
        ),
    );
    let orchestrator = backends
        .builder()
        .config(config_with_timeout(100))
        .build()
        .unwrap();

    let started = Instant::now();
    let response = orchestrator.search(Query::new("slow dense")).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(response.backends_unavailable.len(), 1);
    assert_eq!(response.backends_unavailable[0].backend, BackendKind::Dense);
    assert!(response.backends_unavailable[0].reason.contains("timed out"));
    assert_eq!(response.total_matched, 2);
}

#[tokio::test]
async fn test_scenario_all_backends_time_out() {
    let log = TestLogger::new("test_scenario_all_backends_time_out");
    let backends = Backends::new(
        MockBackend::hanging(BackendKind::Keyword),
        MockBackend::hanging(BackendKind::Dense),
        MockBackend::hanging(BackendKind::Sparse),
    );
    let orchestrator = backends
        .builder()
        .config(config_with_timeout(50))
        .build()
        .unwrap();

    let err = orchestrator
        .search(Query::new("neural networks"))
        .await
        .unwrap_err();
    log.log_actual(&err.to_string());

    match &err {
        SearchError::RetrievalUnavailable { failures } => assert_eq!(failures.len(), 3),
        other => panic!("expected RetrievalUnavailable, got {other:?}"),
    }
    assert!(err.is_user_facing());
    assert!(orchestrator.cache().is_empty());
    assert_eq!(orchestrator.cache().stats().writes, 0);
    log.pass();
}

#[tokio::test]
async fn test_all_backends_failing_is_retried_not_cached() {
    let backends = Backends::new(
        MockBackend::failing(BackendKind::Keyword, "a"),
        MockBackend::failing(BackendKind::Dense, "b"),
        MockBackend::failing(BackendKind::Sparse, "c"),
    );
    let orchestrator = backends.orchestrator();

    for _ in 0..2 {
        let err = orchestrator.search(Query::new("q")).await.unwrap_err();
        assert!(matches!(err, SearchError::RetrievalUnavailable { .. }));
    }
    // the second attempt went back to the backends
    assert_eq!(backends.calls(), [2, 2, 2]);
}

#[tokio::test]
async fn test_invalid_filter_rejected_before_backends() {
    let backends = Backends::returning(&["A"], &["A"], &["A"]);
    let orchestrator = backends.orchestrator();

    let mut filters = hybrid_search::search::SearchFilters::new();
    filters.min_quality = Some(f64::NAN);
    let err = orchestrator
        .search(Query::new("q").with_filters(filters))
        .await
        .unwrap_err();

    assert!(matches!(err, SearchError::InvalidFilter(_)));
    assert_eq!(backends.calls(), [0, 0, 0]);
}

#[tokio::test]
async fn test_cancellation_drops_backend_calls() {
    let backends = Backends::new(
        MockBackend::hanging(BackendKind::Keyword),
        MockBackend::hanging(BackendKind::Dense),
        MockBackend::hanging(BackendKind::Sparse),
    );
    let orchestrator = backends.orchestrator();

    let started = Instant::now();
    let err = orchestrator
        .search_cancellable(
            Query::new("cancel me"),
            tokio::time::sleep(Duration::from_millis(30)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SearchError::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(orchestrator.cache().is_empty());
}
