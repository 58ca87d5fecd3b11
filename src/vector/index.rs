//! The in-memory embedding index served to queries.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PageSiftError, Result};
use crate::storage::Storage;
use crate::vector::manifest::{self, IndexManifest};
use crate::vector::metadata::{MetadataCatalog, PageMetadata};
use crate::vector::page::PageEmbedding;
use crate::vector::store::EmbeddingStore;

/// Page embeddings paired one to one with their metadata.
///
/// An index is validated on construction and immutable afterwards. Updating
/// the served pages means building a new index and publishing it in place of
/// the old one.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    dimension: usize,
    pages: Vec<PageEmbedding>,
    metadata: Vec<PageMetadata>,
    generation: u64,
}

/// Summary figures for an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub page_count: usize,
    pub vector_count: usize,
    pub dimension: usize,
    pub min_vectors_per_page: usize,
    pub max_vectors_per_page: usize,
    pub avg_vectors_per_page: f64,
    pub memory_bytes: usize,
}

impl EmbeddingIndex {
    /// Pair `pages` with `metadata`.
    ///
    /// Fails with a consistency error if the counts differ or any page is
    /// empty, has the wrong dimension or holds non-finite values.
    pub fn new(dimension: usize, pages: Vec<PageEmbedding>, metadata: Vec<PageMetadata>) -> Result<Self> {
        if dimension == 0 {
            return Err(PageSiftError::invalid_argument("index dimension must be positive"));
        }
        MetadataCatalog::validate(&pages, &metadata)?;
        for (page_index, page) in pages.iter().enumerate() {
            page.check(dimension).map_err(|msg| {
                PageSiftError::consistency(format!("page {page_index}: {msg}"))
            })?;
        }

        Ok(Self {
            dimension,
            pages,
            metadata,
            generation: 0,
        })
    }

    /// An index with no pages.
    pub fn empty(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            pages: Vec::new(),
            metadata: Vec::new(),
            generation: 0,
        }
    }

    /// Load the generation published in `storage`.
    ///
    /// Nothing is returned unless the manifest, the embedding store and the
    /// metadata catalog all load and agree with each other.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        let manifest = IndexManifest::load(storage.as_ref())?;
        let stored = EmbeddingStore::new(storage.clone()).load(&manifest.embeddings_file)?;
        let metadata = MetadataCatalog::new(storage).load(&manifest.metadata_file)?;

        if stored.dimension != manifest.dimension {
            return Err(PageSiftError::consistency(format!(
                "manifest records dimension {} but {} records {}",
                manifest.dimension, manifest.embeddings_file, stored.dimension
            )));
        }
        if stored.pages.len() != manifest.page_count {
            return Err(PageSiftError::consistency(format!(
                "manifest records {} pages but {} holds {}",
                manifest.page_count,
                manifest.embeddings_file,
                stored.pages.len()
            )));
        }

        let mut index = Self::new(stored.dimension, stored.pages, metadata)?;
        index.generation = manifest.generation;

        if index.vector_count() != manifest.vector_count {
            return Err(PageSiftError::consistency(format!(
                "manifest records {} vectors but the store holds {}",
                manifest.vector_count,
                index.vector_count()
            )));
        }

        log::info!(
            "Opened index generation {}: {} pages, {} vectors, dimension {}",
            index.generation,
            index.len(),
            index.vector_count(),
            index.dimension
        );
        Ok(index)
    }

    /// Persist this index as a new generation of `storage` and publish it.
    ///
    /// Superseded generation files are removed after the manifest is
    /// replaced. If anything fails before that, the published generation is
    /// left untouched.
    pub fn persist(&mut self, storage: Arc<dyn Storage>, encoder: &str) -> Result<IndexManifest> {
        let generation = manifest::next_generation(storage.as_ref())?;
        let manifest = IndexManifest::new(
            generation,
            self.dimension,
            self.len(),
            self.vector_count(),
            encoder,
        );

        EmbeddingStore::new(storage.clone()).save(&manifest.embeddings_file, self.dimension, &self.pages)?;
        MetadataCatalog::new(storage.clone()).save(&manifest.metadata_file, &self.metadata)?;
        manifest.publish(storage.as_ref())?;
        self.generation = generation;

        let removed = manifest::remove_superseded(storage.as_ref(), generation);
        if removed > 0 {
            log::debug!("Removed {removed} superseded index files");
        }
        Ok(manifest)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// The generation this index was loaded from or last persisted as.
    /// Zero for an index that never touched storage.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pages(&self) -> &[PageEmbedding] {
        &self.pages
    }

    pub fn page(&self, page_index: usize) -> Option<&PageEmbedding> {
        self.pages.get(page_index)
    }

    pub fn metadata(&self, page_index: usize) -> Option<&PageMetadata> {
        self.metadata.get(page_index)
    }

    pub fn all_metadata(&self) -> &[PageMetadata] {
        &self.metadata
    }

    /// Total number of page vectors.
    pub fn vector_count(&self) -> usize {
        self.pages.iter().map(PageEmbedding::len).sum()
    }

    pub fn stats(&self) -> IndexStats {
        let counts = self.pages.iter().map(PageEmbedding::len);
        let vector_count = self.vector_count();
        let avg = if self.pages.is_empty() {
            0.0
        } else {
            vector_count as f64 / self.pages.len() as f64
        };

        IndexStats {
            page_count: self.pages.len(),
            vector_count,
            dimension: self.dimension,
            min_vectors_per_page: counts.clone().min().unwrap_or(0),
            max_vectors_per_page: counts.max().unwrap_or(0),
            avg_vectors_per_page: avg,
            memory_bytes: self.pages.iter().map(PageEmbedding::memory_usage).sum::<usize>()
                + self
                    .metadata
                    .iter()
                    .map(|m| {
                        std::mem::size_of::<PageMetadata>()
                            + m.file_path.len()
                            + m.image_file.as_ref().map_or(0, String::len)
                    })
                    .sum::<usize>(),
        }
    }
}
