//! Unit tests for fusion weights and the adaptive weight policy.

use std::collections::{BTreeMap, BTreeSet};

use hybrid_search::error::SearchError;
use hybrid_search::search::{
    AdaptiveWeightPolicy, BackendKind, HybridWeights, QueryCharacterizer, UnavailablePolicy,
};
use hybrid_search::test_utils::{TestCase, run_table_tests};

fn available(backends: &[BackendKind]) -> BTreeSet<BackendKind> {
    backends.iter().copied().collect()
}

fn all() -> BTreeSet<BackendKind> {
    BackendKind::ALL.into_iter().collect()
}

/// Rounded so table expectations can use exact literals.
fn rounded(w: &HybridWeights) -> [i64; 3] {
    w.as_array().map(|x| (x * 1000.0).round() as i64)
}

// ============================================================================
// HybridWeights
// ============================================================================

#[test]
fn parse_weight_strings() {
    let cases = vec![
        TestCase::new("canonical", "0.3,0.4,0.3", Some([300, 400, 300])),
        TestCase::new("spaces", " 0.5 , 0.25 ,0.25 ", Some([500, 250, 250])),
        TestCase::new("unnormalized", "2,1,1", Some([500, 250, 250])),
        TestCase::new("keyword only", "1,0,0", Some([1000, 0, 0])),
        TestCase::new("too few", "0.5,0.5", None),
        TestCase::new("not a number", "a,b,c", None),
        TestCase::new("negative", "-1,1,1", None),
        TestCase::new("all zero", "0,0,0", None),
    ];

    run_table_tests(cases, |spec| {
        HybridWeights::parse(spec).ok().map(|w| rounded(&w))
    });
}

#[test]
fn invalid_weights_use_weights_error() {
    let err = HybridWeights::new(f64::INFINITY, 0.0, 0.0).unwrap_err();
    assert!(matches!(err, SearchError::InvalidWeights(_)));
}

#[test]
fn restricted_to_redistributes() {
    let base = HybridWeights::default();
    let cases = vec![
        TestCase::new("all available", BackendKind::ALL.to_vec(), [300, 400, 300]),
        TestCase::new(
            "sparse down",
            vec![BackendKind::Keyword, BackendKind::Dense],
            [429, 571, 0],
        ),
        TestCase::new("dense only", vec![BackendKind::Dense], [0, 1000, 0]),
        TestCase::new("none reported", vec![], [300, 400, 300]),
    ];

    run_table_tests(cases, |backends| rounded(&base.restricted_to(&available(&backends))));
}

#[test]
fn restricted_to_splits_equally_when_survivors_had_no_weight() {
    let keyword_only = HybridWeights::new(1.0, 0.0, 0.0).unwrap();
    let w = keyword_only.restricted_to(&available(&[BackendKind::Dense, BackendKind::Sparse]));
    assert_eq!(w.as_array(), [0.0, 0.5, 0.5]);
}

#[test]
fn canonical_key_is_stable() {
    let a = HybridWeights::new(0.3, 0.4, 0.3).unwrap();
    let b = HybridWeights::parse("0.3,0.4,0.3").unwrap();
    assert_eq!(a.canonical_key(), b.canonical_key());
    assert_ne!(
        a.canonical_key(),
        HybridWeights::new(0.4, 0.3, 0.3).unwrap().canonical_key()
    );
}

// ============================================================================
// AdaptiveWeightPolicy
// ============================================================================

fn fired(names: &[&str]) -> String {
    names.join(",")
}

#[test]
fn adaptive_rules_by_query_shape() {
    let characterizer = QueryCharacterizer::default();
    let policy = AdaptiveWeightPolicy::default();

    let cases = vec![
        TestCase::new(
            "single acronym",
            "RRF",
            ([500, 300, 200], fired(&["short_or_specific"])),
        ),
        TestCase::new(
            "long question",
            "what is the best way to combine rankings",
            ([150, 550, 300], fired(&["natural_question"])),
        ),
        TestCase::new(
            "plain descriptive",
            "combining ranked lists from several systems",
            ([300, 400, 300], fired(&[])),
        ),
        TestCase::new(
            "question with identifier",
            "how does rank_fusion handle ties",
            (
                [350, 450, 200],
                fired(&["short_or_specific", "natural_question"]),
            ),
        ),
        TestCase::new(
            "quoted phrase",
            "papers about \"rank fusion\" methods",
            ([500, 300, 200], fired(&["short_or_specific"])),
        ),
    ];

    run_table_tests(cases, |text| {
        let decision = policy.select_weights(&characterizer.characterize(text), &all());
        (rounded(&decision.weights), decision.rules_fired.join(","))
    });
}

#[test]
fn adaptive_then_unavailable_backend_zeroed() {
    let characterizer = QueryCharacterizer::default();
    let policy = AdaptiveWeightPolicy::default();

    let decision = policy.select_weights(
        &characterizer.characterize("RRF"),
        &available(&[BackendKind::Keyword, BackendKind::Sparse]),
    );

    // (0.5, 0.3, 0.2) with dense removed
    assert_eq!(rounded(&decision.weights), [714, 0, 286]);
    assert_eq!(decision.zeroed, vec![BackendKind::Dense]);
    assert!((decision.weights.sum() - 1.0).abs() < 1e-9);
}

#[test]
fn fixed_policy_uses_configured_triple() {
    let table = BTreeMap::from([("keyword+dense".to_string(), [0.6, 0.4, 0.0])]);
    let policy = AdaptiveWeightPolicy::default()
        .with_unavailable_policy(UnavailablePolicy::Fixed, table);
    let features = QueryCharacterizer::default().characterize("plain descriptive longer query");

    let configured = policy.select_weights(
        &features,
        &available(&[BackendKind::Keyword, BackendKind::Dense]),
    );
    assert_eq!(configured.weights.as_array(), [0.6, 0.4, 0.0]);

    // no entry for this surviving set: proportional
    let proportional =
        policy.select_weights(&features, &available(&[BackendKind::Dense, BackendKind::Sparse]));
    assert_eq!(rounded(&proportional.weights), [0, 571, 429]);

    // nothing failed: the fixed table is not consulted
    let untouched = policy.select_weights(&features, &all());
    assert_eq!(untouched.weights, HybridWeights::default());
}

#[test]
fn explicit_weights_skip_rules() {
    let policy = AdaptiveWeightPolicy::default();
    let features = QueryCharacterizer::default().characterize("RRF");
    let explicit = HybridWeights::explicit(0.2, 0.2, 0.6).unwrap();

    let decision = policy.resolve(Some(&explicit), &features, &all());
    assert!(decision.explicit);
    assert!(decision.rules_fired.is_empty());
    assert_eq!(decision.weights, explicit);

    let degraded = policy.resolve(
        Some(&explicit),
        &features,
        &available(&[BackendKind::Keyword, BackendKind::Dense]),
    );
    assert_eq!(degraded.weights.as_array(), [0.5, 0.5, 0.0]);
    assert_eq!(degraded.zeroed, vec![BackendKind::Sparse]);
}
