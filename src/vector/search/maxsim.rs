//! MaxSim scoring between a query vector set and a page.
//!
//! For every query vector the best-matching page vector is found by dot
//! product, and those per-query maxima are summed:
//!
//! ```text
//! score(p) = Σ_j max_i dot(q_j, v_i)
//! ```
//!
//! The max is taken over page vectors first and the sum over query vectors
//! second. Swapping the two reductions gives a different score.

use crate::util::simd;
use crate::vector::page::{PageEmbedding, QueryVectors};

/// Scores pages against a query, reusing one similarity buffer.
///
/// A scorer is cheap to create but holds per-call scratch space, so give each
/// worker thread its own.
#[derive(Debug, Default)]
pub struct MaxSimScorer {
    similarities: Vec<f32>,
}

impl MaxSimScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score `page` against `query`. Both must share a dimension.
    ///
    /// A page without vectors scores zero.
    pub fn score(&mut self, query: &QueryVectors, page: &PageEmbedding) -> f32 {
        debug_assert_eq!(query.dimension(), page.dimension());
        let page_vectors = page.len();
        if page_vectors == 0 {
            return 0.0;
        }

        // Row j holds the similarities of query vector j to every page vector.
        simd::dot_matrix(
            query.as_slice(),
            page.as_slice(),
            query.dimension(),
            &mut self.similarities,
        );

        self.similarities
            .chunks_exact(page_vectors)
            .map(|row| row.iter().copied().fold(f32::NEG_INFINITY, f32::max))
            .sum()
    }
}

/// Score a single page with a throwaway scorer.
pub fn maxsim(query: &QueryVectors, page: &PageEmbedding) -> f32 {
    MaxSimScorer::new().score(query, page)
}
