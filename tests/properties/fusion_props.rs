//! Property tests for RRF fusion.

use proptest::prelude::*;

use hybrid_search::search::{BackendKind, FusionEngine, FusionScore, HybridWeights, RankedList};

/// Up to `n` distinct ids drawn from a small pool so lists overlap.
fn arb_list(backend: BackendKind, n: usize) -> impl Strategy<Value = RankedList> {
    prop::sample::subsequence((0..20).map(|i| format!("d{i:02}")).collect::<Vec<_>>(), 0..=n)
        .prop_shuffle()
        .prop_map(move |ids| RankedList::from_ids(backend, ids))
}

fn arb_lists() -> impl Strategy<Value = Vec<RankedList>> {
    (
        arb_list(BackendKind::Keyword, 12),
        arb_list(BackendKind::Dense, 12),
        arb_list(BackendKind::Sparse, 12),
    )
        .prop_map(|(k, d, s)| vec![k, d, s])
}

fn arb_weights() -> impl Strategy<Value = HybridWeights> {
    (0.01f64..1.0, 0.01f64..1.0, 0.01f64..1.0)
        .prop_map(|(k, d, s)| HybridWeights::new(k, d, s).unwrap())
}

fn score_of(fused: &[FusionScore], doc_id: &str) -> f64 {
    fused.iter().find(|s| s.doc_id == doc_id).map(|s| s.score).unwrap()
}

proptest! {
    #[test]
    fn fused_order_is_sorted_and_ranked(lists in arb_lists(), weights in arb_weights()) {
        let fused = FusionEngine::default().fuse(&lists, &weights);

        for (i, score) in fused.iter().enumerate() {
            prop_assert_eq!(score.fusion_rank, i + 1);
        }
        for pair in fused.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn every_candidate_appears_exactly_once(lists in arb_lists(), weights in arb_weights()) {
        let fused = FusionEngine::default().fuse(&lists, &weights);

        let mut expected: Vec<&str> = lists.iter().flat_map(|list| list.ids()).collect();
        expected.sort_unstable();
        expected.dedup();
        let mut got: Vec<&str> = fused.iter().map(|s| s.doc_id.as_str()).collect();
        got.sort_unstable();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn score_is_sum_of_present_terms(lists in arb_lists(), weights in arb_weights()) {
        let engine = FusionEngine::default();
        let fused = engine.fuse(&lists, &weights);

        for score in &fused {
            let mut expected = 0.0;
            for list in &lists {
                if let Some(rank) = list.rank_of(&score.doc_id) {
                    expected += weights.get(list.backend()) / (engine.k() + rank as f64);
                }
            }
            prop_assert!((score.score - expected).abs() < 1e-12);
            prop_assert_eq!(score.ranks.len(), score.contributions.len());
        }
    }

    #[test]
    fn promoting_a_document_raises_its_score(
        lists in arb_lists(),
        weights in arb_weights(),
    ) {
        let engine = FusionEngine::default();
        let keyword = &lists[0];
        prop_assume!(keyword.len() >= 2);

        // move the last keyword hit to the top
        let mut ids: Vec<String> = keyword.ids().map(str::to_string).collect();
        let promoted = ids.pop().unwrap();
        prop_assume!(keyword.rank_of(&promoted).unwrap() > 1);
        ids.insert(0, promoted.clone());
        let mut moved = lists.clone();
        moved[0] = RankedList::from_ids(BackendKind::Keyword, ids);

        let before = score_of(&engine.fuse(&lists, &weights), &promoted);
        let after = score_of(&engine.fuse(&moved, &weights), &promoted);
        prop_assert!(after > before, "{after} should exceed {before}");
    }

    #[test]
    fn demoting_a_document_lowers_its_score(
        lists in arb_lists(),
        weights in arb_weights(),
    ) {
        let engine = FusionEngine::default();
        let keyword = &lists[0];
        prop_assume!(keyword.len() >= 2);

        // move the top keyword hit to the bottom
        let mut ids: Vec<String> = keyword.ids().map(str::to_string).collect();
        let demoted = ids.remove(0);
        prop_assume!(keyword.rank_of(&demoted) == Some(1));
        ids.push(demoted.clone());
        let mut moved = lists.clone();
        moved[0] = RankedList::from_ids(BackendKind::Keyword, ids);

        let before = score_of(&engine.fuse(&lists, &weights), &demoted);
        let after = score_of(&engine.fuse(&moved, &weights), &demoted);
        prop_assert!(after < before, "{after} should be below {before}");
    }

    #[test]
    fn fusion_is_deterministic(lists in arb_lists(), weights in arb_weights()) {
        let engine = FusionEngine::default();
        let mut reversed = lists.clone();
        reversed.reverse();
        prop_assert_eq!(engine.fuse(&lists, &weights), engine.fuse(&reversed, &weights));
    }
}
