//! Unit tests for configuration loading.
//!
//! Environment overrides are not exercised here: tests run in parallel and
//! share the process environment.

use hybrid_search::config::Config;
use hybrid_search::error::SearchError;
use hybrid_search::search::{FilterStage, HybridWeights, UnavailablePolicy};
use hybrid_search::test_utils::fixtures::UnitTestFixture;

#[test]
fn explicit_file_overrides_defaults() {
    let fixture = UnitTestFixture::new();
    let path = fixture.create_file(
        "hs.toml",
        r#"
[retrieval]
per_backend_k = 250
timeout_ms = 750

[weights]
keyword = 0.5
dense = 0.25
sparse = 0.25

[cache]
ttl_seconds = 10
"#,
    );

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.retrieval.per_backend_k, 250);
    assert_eq!(config.retrieval.timeout_ms, 750);
    assert_eq!(
        config.weights.base().unwrap(),
        HybridWeights::new(0.5, 0.25, 0.25).unwrap()
    );
    assert_eq!(config.cache.ttl_seconds, 10);
    // untouched sections keep their defaults
    assert_eq!(config.fusion.rrf_k, 60.0);
}

#[test]
fn missing_explicit_file_falls_back_to_defaults() {
    let fixture = UnitTestFixture::new();
    let path = fixture.data_path.join("does-not-exist.toml");

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.retrieval, Config::default().retrieval);
}

#[test]
fn malformed_file_is_a_config_error() {
    let fixture = UnitTestFixture::new();
    let path = fixture.create_file("broken.toml", "[retrieval\nper_backend_k = ");

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(matches!(err, SearchError::Config(_)));
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn unnormalized_weights_are_rescaled() {
    let config = Config::from_toml_str("[weights]\nkeyword = 2.0\ndense = 1.0\nsparse = 1.0\n")
        .unwrap();
    let base = config.weights.base().unwrap();
    assert!((base.keyword - 0.5).abs() < 1e-12);
    assert!((base.sum() - 1.0).abs() < 1e-12);
}

#[test]
fn negative_weight_is_rejected() {
    let err = Config::from_toml_str("[weights]\nkeyword = -0.1\n").unwrap_err();
    assert!(matches!(err, SearchError::Config(_)));
}

#[test]
fn fixed_fallback_and_filter_stage_parse() {
    let config = Config::from_toml_str(
        r#"
[fusion]
filter_stage = "pre_fusion"

[weights]
unavailable_policy = "fixed"

[weights.fixed_fallback]
"dense+sparse" = [0.0, 0.7, 0.3]
"#,
    )
    .unwrap();

    assert_eq!(config.fusion.filter_stage, FilterStage::PreFusion);
    assert_eq!(config.weights.unavailable_policy, UnavailablePolicy::Fixed);
    assert_eq!(
        config.weights.fixed_fallback["dense+sparse"],
        [0.0, 0.7, 0.3]
    );
}

#[test]
fn unknown_top_level_key_is_rejected() {
    let err = Config::from_toml_str("verbose = true\n").unwrap_err();
    assert!(matches!(err, SearchError::Config(_)));
}

#[test]
fn rendered_toml_parses_back() {
    let mut config = Config::default();
    config.rerank.enabled = true;
    config.facets.tag_fields = vec!["topic".into(), "venue".into()];

    let rendered = config.to_toml().unwrap();
    assert!(rendered.contains("[rerank]"));
    assert_eq!(Config::from_toml_str(&rendered).unwrap(), config);
}

#[test]
fn tag_field_cannot_shadow_builtin_facet() {
    let err = Config::from_toml_str("[facets]\ntag_fields = [\"topic\", \"quality\"]\n").unwrap_err();
    assert!(err.to_string().contains("'quality' is reserved"));

    let mut config = Config::default();
    config.facets.tag_fields = vec!["classification".into()];
    assert!(matches!(config.validate(), Err(SearchError::Config(_))));

    config.facets.tag_fields = vec!["classifications".into()];
    assert!(config.validate().is_ok());
}
