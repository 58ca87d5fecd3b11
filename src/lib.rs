//! # pagesift
//!
//! Late-interaction page retrieval for visual document search.
//!
//! Every document page is stored as a set of embedding vectors produced by a
//! multi-vector image encoder. A query is encoded into its own vector set and
//! pages are ranked by MaxSim: for each query vector the best-matching page
//! vector is taken, and those maxima are summed.
//!
//! ## Features
//!
//! - Batched, optionally concurrent index builds with per-batch checkpoints
//! - Versioned on-disk index published through an atomic manifest swap
//! - SIMD MaxSim scoring, parallelized across pages for large indexes
//! - Hot reload of the served index without blocking searches
//! - Pluggable storage backends and encoders

pub mod cli;
pub mod embedding;
pub mod error;
pub mod retriever;
pub mod storage;
pub mod util;
pub mod vector;

pub mod prelude {
    pub use crate::embedding::{PageEncoder, PageImage, PrecomputedEncoder, QueryEncoder};
    pub use crate::error::{PageSiftError, Result};
    pub use crate::retriever::{PageHit, PageRetriever, RetrieverConfig};
    pub use crate::storage::{FileStorage, MemoryStorage, Storage, StorageConfig};
    pub use crate::vector::builder::{BuildReport, FailurePolicy, IndexBuilder, IndexBuilderConfig};
    pub use crate::vector::search::{RetrievalConfig, RetrievalEngine, ScoreNormalization, ScoredPage};
    pub use crate::vector::{EmbeddingIndex, MultiVector, PageEmbedding, PageMetadata, QueryVectors};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
