//! Reciprocal Rank Fusion (§4.2 step 3).
//!
//! `rrf_score(node) = Σ 1 / (k + rank_i)` over every ranked list the node
//! appears in, with `rank_i` 1-indexed within list `i`. The constant `k`
//! (default 60, see [`crate::config::RetrievalConfig::rrf_k`]) dampens the
//! influence of a single very high rank from one strategy dominating the
//! fused score.

use std::collections::HashMap;
use std::hash::Hash;

/// Fuses any number of ranked lists into a single map from item to
/// RRF score. Ties within a single list are broken by the order the
/// caller supplies (earlier = better rank).
pub fn reciprocal_rank_fusion<T: Eq + Hash + Clone>(
    lists: &[Vec<T>],
    k: u32,
) -> HashMap<T, f64> {
    let k = f64::from(k);
    let mut scores: HashMap<T, f64> = HashMap::new();
    for list in lists {
        for (index, item) in list.iter().enumerate() {
            let rank = (index + 1) as f64;
            *scores.entry(item.clone()).or_insert(0.0) += 1.0 / (k + rank);
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_list_score_matches_formula() {
        let lists = vec![vec!["a", "b", "c"]];
        let scores = reciprocal_rank_fusion(&lists, 60);
        assert!((scores[&"a"] - 1.0 / 61.0).abs() < 1e-12);
        assert!((scores[&"b"] - 1.0 / 62.0).abs() < 1e-12);
        assert!((scores[&"c"] - 1.0 / 63.0).abs() < 1e-12);
    }

    #[test]
    fn appearing_in_both_lists_sums_contributions() {
        let lists = vec![vec!["a", "b"], vec!["b", "a"]];
        let scores = reciprocal_rank_fusion(&lists, 60);
        let expected_a = 1.0 / 61.0 + 1.0 / 62.0;
        let expected_b = 1.0 / 62.0 + 1.0 / 61.0;
        assert!((scores[&"a"] - expected_a).abs() < 1e-12);
        assert!((scores[&"b"] - expected_b).abs() < 1e-12);
        assert!((scores[&"a"] - scores[&"b"]).abs() < 1e-12);
    }

    #[test]
    fn item_only_in_one_list_is_still_scored() {
        let lists = vec![vec!["a", "b"], vec!["a"]];
        let scores = reciprocal_rank_fusion(&lists, 60);
        assert!(scores.contains_key(&"b"));
        assert!(scores[&"a"] > scores[&"b"]);
    }

    #[test]
    fn monotonicity_holds_across_both_lists() {
        // If X outranks Y in both lists, X's fused score must exceed Y's.
        let fulltext = vec!["x", "y", "z"];
        let vector = vec!["x", "z", "y"];
        let scores = reciprocal_rank_fusion(&[fulltext, vector], 60);
        assert!(scores[&"x"] > scores[&"y"]);
        assert!(scores[&"x"] > scores[&"z"]);
    }

    #[test]
    fn empty_lists_yield_empty_scores() {
        let lists: Vec<Vec<&str>> = vec![vec![], vec![]];
        let scores = reciprocal_rank_fusion(&lists, 60);
        assert!(scores.is_empty());
    }

    #[test]
    fn larger_k_compresses_score_spread() {
        let lists = vec![vec!["a", "b"]];
        let tight = reciprocal_rank_fusion(&lists, 1000);
        let loose = reciprocal_rank_fusion(&lists, 1);
        let tight_spread = tight[&"a"] - tight[&"b"];
        let loose_spread = loose[&"a"] - loose[&"b"];
        assert!(tight_spread < loose_spread);
    }

    fn permutation_of(n: usize) -> impl Strategy<Value = Vec<usize>> {
        Just((0..n).collect::<Vec<usize>>()).prop_shuffle()
    }

    proptest! {
        /// §8 "RRF monotonicity": if X outranks Y in both input lists, X's
        /// fused score must exceed Y's, for arbitrary rankings.
        #[test]
        fn monotonicity_holds_for_arbitrary_rankings(
            fulltext in permutation_of(6),
            vector in permutation_of(6),
        ) {
            let scores = reciprocal_rank_fusion(&[fulltext.clone(), vector.clone()], 60);
            for &x in &fulltext {
                for &y in &fulltext {
                    if x == y {
                        continue;
                    }
                    let x_beats_y_in_fulltext = fulltext.iter().position(|&v| v == x) < fulltext.iter().position(|&v| v == y);
                    let x_beats_y_in_vector = vector.iter().position(|&v| v == x) < vector.iter().position(|&v| v == y);
                    if x_beats_y_in_fulltext && x_beats_y_in_vector {
                        prop_assert!(scores[&x] > scores[&y]);
                    }
                }
            }
        }
    }
}
