//! Unit tests for weighted RRF fusion.

use hybrid_search::search::{BackendKind, FusionEngine, HybridWeights, RankedList};

fn list(backend: BackendKind, ids: &[&str]) -> RankedList {
    RankedList::from_ids(backend, ids.iter().copied())
}

fn order(fused: &[hybrid_search::search::FusionScore]) -> Vec<&str> {
    fused.iter().map(|s| s.doc_id.as_str()).collect()
}

#[test]
fn list_order_does_not_change_result() {
    let engine = FusionEngine::default();
    let weights = HybridWeights::new(0.3, 0.4, 0.3).unwrap();
    let keyword = list(BackendKind::Keyword, &["A", "B", "C"]);
    let dense = list(BackendKind::Dense, &["C", "B", "A"]);
    let sparse = list(BackendKind::Sparse, &["B", "D"]);

    let forward = engine.fuse(&[keyword.clone(), dense.clone(), sparse.clone()], &weights);
    let reversed = engine.fuse(&[sparse, dense, keyword], &weights);

    assert_eq!(forward, reversed);
    assert_eq!(order(&forward)[0], "B");
}

#[test]
fn custom_k_changes_scores() {
    let weights = HybridWeights::new(1.0, 0.0, 0.0).unwrap();
    let lists = [list(BackendKind::Keyword, &["A"])];

    assert_eq!(FusionEngine::new(10.0).fuse(&lists, &weights)[0].score, 1.0 / 11.0);
    assert_eq!(FusionEngine::new(60.0).fuse(&lists, &weights)[0].score, 1.0 / 61.0);
    // unusable k falls back to the default
    assert_eq!(FusionEngine::new(f64::NAN).k(), 60.0);
}

#[test]
fn zero_weight_list_contributes_no_candidates() {
    let engine = FusionEngine::default();
    let weights = HybridWeights::new(0.5, 0.5, 0.0).unwrap();
    let lists = [
        list(BackendKind::Keyword, &["A"]),
        list(BackendKind::Dense, &["B"]),
        list(BackendKind::Sparse, &["only-sparse"]),
    ];

    let fused = engine.fuse(&lists, &weights);
    assert_eq!(fused.len(), 2);
    assert!(fused.iter().all(|s| s.doc_id != "only-sparse"));
}

#[test]
fn repeated_id_in_one_list_counts_once() {
    let engine = FusionEngine::default();
    let weights = HybridWeights::new(1.0, 0.0, 0.0).unwrap();
    let fused = engine.fuse(&[list(BackendKind::Keyword, &["A", "B", "A"])], &weights);

    let a = fused.iter().find(|s| s.doc_id == "A").unwrap();
    assert_eq!(a.ranks[&BackendKind::Keyword], 1);
    assert_eq!(a.score, 1.0 / 61.0);
}

#[test]
fn better_best_rank_wins_a_score_tie() {
    let engine = FusionEngine::default();
    let weights = HybridWeights::new(0.5, 0.5, 0.0).unwrap();
    // P: ranks 1 and 3; Q: ranks 2 and 2
    let lists = [
        list(BackendKind::Keyword, &["P", "Q", "x"]),
        list(BackendKind::Dense, &["y", "Q", "P"]),
    ];

    let fused = engine.fuse(&lists, &weights);
    let p = fused.iter().find(|s| s.doc_id == "P").unwrap();
    let q = fused.iter().find(|s| s.doc_id == "Q").unwrap();

    // 1/61 + 1/63 > 2/62, so P leads on score alone
    assert!(p.score > q.score);
    assert!(p.fusion_rank < q.fusion_rank);
    assert_eq!(p.min_rank(), 1);
    assert_eq!(q.sources(), vec![BackendKind::Keyword, BackendKind::Dense]);
}

#[test]
fn empty_input_fuses_to_nothing() {
    let engine = FusionEngine::default();
    let weights = HybridWeights::default();
    assert!(engine.fuse(&[], &weights).is_empty());
    assert!(
        engine
            .fuse(&[RankedList::empty(BackendKind::Dense)], &weights)
            .is_empty()
    );
}
