//! Late-interaction retrieval over an [`EmbeddingIndex`](crate::vector::index::EmbeddingIndex).
//!
//! - [`maxsim`]: per-page MaxSim scoring
//! - [`ranking`]: top-k selection with deterministic tie-breaking
//! - [`engine`]: the [`RetrievalEngine`] tying them together

pub mod engine;
pub mod maxsim;
pub mod ranking;

pub use engine::{RetrievalConfig, RetrievalEngine, ScoreNormalization};
pub use maxsim::MaxSimScorer;
pub use ranking::ScoredPage;
