//! Retrieval engine: scores every page of an index and returns the top k.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PageSiftError, Result};
use crate::vector::index::EmbeddingIndex;
use crate::vector::page::QueryVectors;
use crate::vector::search::maxsim::MaxSimScorer;
use crate::vector::search::ranking::{self, ScoredPage};

/// How raw MaxSim scores are scaled before they are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreNormalization {
    /// Return the raw sum of per-query-vector maxima.
    #[default]
    None,
    /// Divide by the number of query vectors.
    QueryLength,
}

/// Configuration for [`RetrievalEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Score scaling applied to results.
    pub normalization: ScoreNormalization,
    /// Minimum page count at which pages are scored in parallel.
    pub parallel_threshold: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            normalization: ScoreNormalization::None,
            parallel_threshold: 256,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.parallel_threshold == 0 {
            return Err(PageSiftError::invalid_config(
                "parallel_threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Ranks the pages of an index against a query vector set.
///
/// Searching only reads the index, so one engine can serve any number of
/// concurrent callers.
#[derive(Debug, Clone, Default)]
pub struct RetrievalEngine {
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(config: RetrievalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Return up to `k` pages of `index` ranked by MaxSim score against
    /// `query`, best first, ties broken by ascending page index.
    ///
    /// An empty index yields no results. A query whose dimension differs from
    /// the index, that holds no vectors or that contains non-finite values is
    /// an encoding error.
    pub fn search(
        &self,
        index: &EmbeddingIndex,
        query: &QueryVectors,
        k: usize,
    ) -> Result<Vec<ScoredPage>> {
        if index.is_empty() {
            log::debug!("Search against an empty index; returning no results");
            return Ok(Vec::new());
        }

        query
            .check(index.dimension())
            .map_err(|msg| PageSiftError::encoding(format!("invalid query vectors: {msg}")))?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let scored = self
            .score_pages(index, query)
            .into_iter()
            .enumerate()
            .map(|(page_index, score)| ScoredPage { page_index, score })
            .collect();
        let mut ranked = ranking::top_k(scored, k);

        if self.config.normalization == ScoreNormalization::QueryLength {
            let scale = query.len() as f32;
            for page in &mut ranked {
                page.score /= scale;
            }
        }
        Ok(ranked)
    }

    /// Raw MaxSim score of every page, in index order.
    pub fn score_pages(&self, index: &EmbeddingIndex, query: &QueryVectors) -> Vec<f32> {
        let pages = index.pages();
        if pages.len() >= self.config.parallel_threshold {
            pages
                .par_iter()
                .map_init(MaxSimScorer::new, |scorer, page| scorer.score(query, page))
                .collect()
        } else {
            let mut scorer = MaxSimScorer::new();
            pages.iter().map(|page| scorer.score(query, page)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::metadata::PageMetadata;
    use crate::vector::page::MultiVector;

    fn mv(vectors: &[&[f32]]) -> MultiVector {
        MultiVector::from_vectors(vectors).unwrap()
    }

    fn index(pages: Vec<MultiVector>) -> EmbeddingIndex {
        let metadata = (1..=pages.len() as u32)
            .map(|n| PageMetadata::new("doc.pdf", n))
            .collect();
        EmbeddingIndex::new(pages[0].dimension(), pages, metadata).unwrap()
    }

    fn three_pages() -> EmbeddingIndex {
        index(vec![
            mv(&[&[1.0, 0.0], &[0.0, 1.0]]),
            mv(&[&[0.5, 0.5], &[0.2, 0.1]]),
            mv(&[&[2.0, 0.0], &[0.0, 0.0]]),
        ])
    }

    #[test]
    fn test_search_ranks_pages() {
        let engine = RetrievalEngine::default();
        let query = mv(&[&[1.0, 0.0]]);

        let results = engine.search(&three_pages(), &query, 2).unwrap();
        assert_eq!(
            results,
            vec![
                ScoredPage { page_index: 2, score: 2.0 },
                ScoredPage { page_index: 0, score: 1.0 },
            ]
        );
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let pages: Vec<MultiVector> = (0..64)
            .map(|i| {
                let x = i as f32 / 10.0;
                mv(&[&[x, 1.0 - x, 0.5], &[(x * 3.0).sin(), x.cos(), -x]])
            })
            .collect();
        let index = index(pages);
        let query = mv(&[&[0.3, -0.2, 0.9], &[1.0, 0.5, 0.0]]);

        let sequential = RetrievalEngine::default();
        let parallel = RetrievalEngine::new(RetrievalConfig {
            parallel_threshold: 1,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            sequential.search(&index, &query, 10).unwrap(),
            parallel.search(&index, &query, 10).unwrap()
        );
    }

    #[test]
    fn test_query_length_normalization() {
        let engine = RetrievalEngine::new(RetrievalConfig {
            normalization: ScoreNormalization::QueryLength,
            ..Default::default()
        })
        .unwrap();
        let query = mv(&[&[1.0, 0.0], &[0.0, 1.0]]);

        let results = engine.search(&three_pages(), &query, 1).unwrap();
        // page 0: 1 + 1 = 2, page 2: 2 + 0 = 2; tie goes to page 0
        assert_eq!(results, vec![ScoredPage { page_index: 0, score: 1.0 }]);
    }

    #[test]
    fn test_invalid_queries_are_encoding_errors() {
        let engine = RetrievalEngine::default();
        let index = three_pages();

        let wrong_dimension = mv(&[&[1.0, 0.0, 0.0]]);
        assert!(engine.search(&index, &wrong_dimension, 3).unwrap_err().is_encoding());

        let empty = MultiVector::new(vec![], 2).unwrap();
        assert!(engine.search(&index, &empty, 3).unwrap_err().is_encoding());

        let infinite = mv(&[&[f32::INFINITY, 0.0]]);
        assert!(engine.search(&index, &infinite, 3).unwrap_err().is_encoding());
    }

    #[test]
    fn test_empty_index_and_zero_k() {
        let engine = RetrievalEngine::default();
        let query = mv(&[&[1.0, 0.0]]);

        assert!(engine.search(&EmbeddingIndex::empty(2), &query, 5).unwrap().is_empty());
        assert!(engine.search(&three_pages(), &query, 0).unwrap().is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(RetrievalConfig::default().validate().is_ok());
        let config = RetrievalConfig {
            parallel_threshold: 0,
            ..Default::default()
        };
        assert!(RetrievalEngine::new(config).is_err());
    }
}
