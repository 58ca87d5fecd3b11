//! Top-k selection over scored pages.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A page position paired with its retrieval score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredPage {
    pub page_index: usize,
    pub score: f32,
}

/// Ranking order: higher score first, lower page index first among equals.
pub fn rank_order(a: &ScoredPage, b: &ScoredPage) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.page_index.cmp(&b.page_index))
}

/// Keep the `k` best of `scored`, sorted by [`rank_order`].
pub fn top_k(mut scored: Vec<ScoredPage>, k: usize) -> Vec<ScoredPage> {
    if k == 0 {
        return Vec::new();
    }
    if k < scored.len() {
        scored.select_nth_unstable_by(k - 1, rank_order);
        scored.truncate(k);
    }
    scored.sort_unstable_by(rank_order);
    scored
}
