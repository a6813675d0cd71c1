//! E2E Scenario: real in-memory backends over the sample corpus.
//!
//! Bm25Index, VectorIndex and SparseIndex are built from a JSON corpus on
//! disk, exactly as the CLI does.

use std::sync::Arc;

use hybrid_search::app::AppContext;
use hybrid_search::config::Config;
use hybrid_search::search::{
    BackendKind, DateRange, FilterStage, Query, SearchFilters, SearchOrchestrator,
};
use hybrid_search::test_utils::fixtures::{UnitTestFixture, sample_store};

use super::fixture::ids;

fn orchestrator(config: Config) -> SearchOrchestrator {
    AppContext::with_config(config, false)
        .orchestrator_for(Arc::new(sample_store()))
        .unwrap()
}

fn topic_config() -> Config {
    let mut config = Config::default();
    config.facets.tag_fields = vec!["topic".to_string()];
    config
}

#[tokio::test]
async fn test_corpus_file_round_trip() {
    let fixture = UnitTestFixture::new();
    let corpus = fixture.create_corpus();
    let ctx = AppContext::with_config(Config::default(), false);

    let orchestrator = ctx.orchestrator(&corpus).unwrap();
    let response = orchestrator
        .search(Query::new("sparse retrieval"))
        .await
        .unwrap();

    assert!(ids(&response).contains(&"splade"));
    assert_eq!(response.backends_used, BackendKind::ALL.to_vec());
}

#[tokio::test]
async fn test_all_three_backends_contribute() {
    let orchestrator = orchestrator(Config::default());
    let response = orchestrator
        .search(Query::new("reciprocal rank fusion"))
        .await
        .unwrap();

    let top = &response.results[0];
    assert_eq!(top.doc_id, "rrf-paper");
    assert_eq!(top.breakdown.ranks.len(), 3);
    let snippet = top.snippet.as_ref().unwrap();
    assert!(snippet.render("<", ">").contains("<Reciprocal>"));
}

#[tokio::test]
async fn test_post_fusion_filters_on_real_backends() {
    let orchestrator = orchestrator(Config::default());
    let filters = SearchFilters::new()
        .classification("cs.CL")
        .date_range(DateRange::new(chrono::NaiveDate::from_ymd_opt(2020, 1, 1), None).unwrap());

    let response = orchestrator
        .search(Query::new("retrieval reranking").with_filters(filters))
        .await
        .unwrap();

    assert_eq!(ids(&response), vec!["dense-retrieval"]);
}

#[tokio::test]
async fn test_pre_fusion_stage_yields_same_membership() {
    let filters = SearchFilters::new().tag("topic", "neural");
    let query = Query::new("retrieval").with_filters(filters);

    let post = orchestrator(Config::default())
        .search(query.clone())
        .await
        .unwrap();

    let mut config = Config::default();
    config.fusion.filter_stage = FilterStage::PreFusion;
    let pre = orchestrator(config).search(query).await.unwrap();

    let mut post_ids = ids(&post);
    let mut pre_ids = ids(&pre);
    post_ids.sort_unstable();
    pre_ids.sort_unstable();
    assert_eq!(post_ids, pre_ids);
    assert!(pre.results.iter().enumerate().all(|(i, r)| r.fusion_rank == i + 1));
}

#[tokio::test]
async fn test_facets_reflect_full_match_set() {
    let orchestrator = orchestrator(topic_config());
    let response = orchestrator
        .search(Query::new("retrieval ranking documents").with_limit(1))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1);
    let topics = &response.facets["topic"];
    let ir = topics.iter().find(|v| v.value == "ir").unwrap();
    assert!(ir.count > 1);
    assert!(topics.iter().all(|v| v.count > 0));
}

#[tokio::test]
async fn test_get_facets_for_filters_only() {
    let orchestrator = orchestrator(topic_config());
    let facets = orchestrator
        .get_facets("", &SearchFilters::new().min_quality(0.7))
        .await
        .unwrap();

    // rrf-paper 0.9, dense-retrieval 0.8, cross-encoder 0.75, bm25-notes 0.7
    let quality: usize = facets["quality"].iter().map(|v| v.count).sum();
    assert_eq!(quality, 4);
    let ir = facets["topic"].iter().find(|v| v.value == "ir").unwrap();
    assert_eq!(ir.count, 4);
}

#[tokio::test]
async fn test_filters_only_search_pages_by_quality() {
    let orchestrator = orchestrator(Config::default());
    let query = Query::new("")
        .allow_filters_only()
        .with_filters(SearchFilters::new().tag("topic", "ir"))
        .with_limit(2)
        .with_offset(1);

    let response = orchestrator.search(query).await.unwrap();

    assert_eq!(response.total_matched, 5);
    assert_eq!(ids(&response), vec!["dense-retrieval", "cross-encoder"]);
    assert!(response.backends_used.is_empty());
}
