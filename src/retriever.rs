//! Serving handle for page retrieval.
//!
//! A [`PageRetriever`] owns the published [`EmbeddingIndex`], the query
//! encoder and the retrieval engine. Searches clone the current index pointer
//! and run without holding any lock, so a [`reload`](PageRetriever::reload)
//! never interrupts them: each search sees either the old index or the new
//! one in full.

pub mod config;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::embedding::encoder::QueryEncoder;
use crate::error::{PageSiftError, Result};
use crate::storage::{FileStorage, Storage};
use crate::vector::index::{EmbeddingIndex, IndexStats};
use crate::vector::page::QueryVectors;
use crate::vector::search::{RetrievalEngine, ScoredPage};

pub use config::RetrieverConfig;

/// A ranked page, joined with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageHit {
    pub file_path: String,
    pub page_number: u32,
    pub score: f32,
}

pub struct PageRetriever {
    storage: Arc<dyn Storage>,
    index: RwLock<Arc<EmbeddingIndex>>,
    reload_lock: Mutex<()>,
    encoder: Arc<dyn QueryEncoder>,
    engine: RetrievalEngine,
    default_top_k: usize,
}

impl std::fmt::Debug for PageRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let index = self.snapshot();
        f.debug_struct("PageRetriever")
            .field("storage", &self.storage)
            .field("generation", &index.generation())
            .field("pages", &index.len())
            .field("encoder", &self.encoder.name())
            .field("engine", &self.engine)
            .finish()
    }
}

impl PageRetriever {
    /// Open the index in `config.index_dir`.
    ///
    /// Fails if the index is missing, corrupt or inconsistent.
    pub fn open(config: RetrieverConfig, encoder: Arc<dyn QueryEncoder>) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(FileStorage::open(&config.index_dir, config.storage.clone())?);
        Self::with_storage(storage, config, encoder)
    }

    /// Open the index published in `storage`. `config.index_dir` is ignored.
    pub fn with_storage(
        storage: Arc<dyn Storage>,
        config: RetrieverConfig,
        encoder: Arc<dyn QueryEncoder>,
    ) -> Result<Self> {
        config.validate()?;
        let engine = RetrievalEngine::new(config.retrieval.clone())?;
        let index = EmbeddingIndex::open(storage.clone())?;
        check_encoder(&index, encoder.as_ref());

        Ok(Self {
            storage,
            index: RwLock::new(Arc::new(index)),
            reload_lock: Mutex::new(()),
            encoder,
            engine,
            default_top_k: config.default_top_k,
        })
    }

    /// Encode `query` and return up to `top_k` best-matching pages.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<PageHit>> {
        let vectors = self.encoder.encode_query(query).await?;
        let index = self.snapshot();
        let ranked = self.engine.search(&index, &vectors, top_k)?;
        let hits = to_hits(&index, &ranked)?;

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "Query {query:?} ({} vectors) against generation {}: {}",
                vectors.len(),
                index.generation(),
                describe_hits(&hits)
            );
        }
        Ok(hits)
    }

    /// [`search`](Self::search) with the configured default hit count.
    pub async fn search_default(&self, query: &str) -> Result<Vec<PageHit>> {
        self.search(query, self.default_top_k).await
    }

    /// Rank pages against query vectors that were encoded elsewhere.
    pub fn search_vectors(&self, query: &QueryVectors, top_k: usize) -> Result<Vec<PageHit>> {
        let index = self.snapshot();
        let ranked = self.engine.search(&index, query, top_k)?;
        to_hits(&index, &ranked)
    }

    /// The currently published index.
    pub fn snapshot(&self) -> Arc<EmbeddingIndex> {
        self.index.read().clone()
    }

    /// Load the generation currently published in storage and swap it in.
    ///
    /// The new index is fully loaded and validated before the swap; if that
    /// fails the served index is unchanged. Returns the served generation.
    pub fn reload(&self) -> Result<u64> {
        let _reloading = self.reload_lock.lock();

        let index = EmbeddingIndex::open(self.storage.clone())?;
        check_encoder(&index, self.encoder.as_ref());
        let generation = index.generation();

        let previous = std::mem::replace(&mut *self.index.write(), Arc::new(index));
        log::info!(
            "Reloaded index: generation {} -> {generation}",
            previous.generation()
        );
        Ok(generation)
    }

    pub fn stats(&self) -> IndexStats {
        self.snapshot().stats()
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }
}

fn check_encoder(index: &EmbeddingIndex, encoder: &dyn QueryEncoder) {
    if !index.is_empty() && encoder.dimension() != index.dimension() {
        log::warn!(
            "Query encoder {} produces dimension {} but the index has dimension {}; queries will fail",
            encoder.name(),
            encoder.dimension(),
            index.dimension()
        );
    }
}

fn to_hits(index: &EmbeddingIndex, ranked: &[ScoredPage]) -> Result<Vec<PageHit>> {
    ranked
        .iter()
        .map(|scored| {
            let metadata = index.metadata(scored.page_index).ok_or_else(|| {
                PageSiftError::internal(format!("page {} has no metadata", scored.page_index))
            })?;
            Ok(PageHit {
                file_path: metadata.file_path.clone(),
                page_number: metadata.page_number,
                score: scored.score,
            })
        })
        .collect()
}

fn describe_hits(hits: &[PageHit]) -> String {
    if hits.is_empty() {
        return "no hits".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(rank, hit)| {
            format!(
                "{}. {}#{} ({:.4})",
                rank + 1,
                hit.file_path,
                hit.page_number,
                hit.score
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}
