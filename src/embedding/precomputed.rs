//! Encoder for vectors computed ahead of time.
//!
//! [`PrecomputedEncoder`] does no inference. It returns embeddings that were
//! registered with it beforehand: page embeddings keyed by
//! [`PageImage::key`], query vectors keyed by the exact query text. This is
//! how indexes are built from vectors exported by an external model, and how
//! tests drive the builder and the retriever.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::embedding::encoder::{PageEncoder, PageImage, QueryEncoder};
use crate::error::{PageSiftError, Result};
use crate::vector::page::{MultiVector, PageEmbedding, QueryVectors};

/// Serves registered page and query vectors.
#[derive(Debug, Clone)]
pub struct PrecomputedEncoder {
    dimension: usize,
    name: String,
    pages: HashMap<String, PageEmbedding>,
    queries: HashMap<String, QueryVectors>,
}

impl PrecomputedEncoder {
    /// Creates an encoder whose vectors all have length `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            name: "precomputed".to_string(),
            pages: HashMap::new(),
            queries: HashMap::new(),
        }
    }

    /// Set the name reported to the index manifest.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register the embedding returned for the page image with `key`.
    pub fn insert_page(&mut self, key: impl Into<String>, embedding: PageEmbedding) -> Result<()> {
        let key = key.into();
        self.check(&key, &embedding)?;
        self.pages.insert(key, embedding);
        Ok(())
    }

    /// Register the vectors returned for `query`.
    pub fn insert_query(&mut self, query: impl Into<String>, vectors: QueryVectors) -> Result<()> {
        let query = query.into();
        self.check(&query, &vectors)?;
        self.queries.insert(query, vectors);
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    fn check(&self, key: &str, vectors: &MultiVector) -> Result<()> {
        vectors
            .check(self.dimension)
            .map_err(|msg| PageSiftError::invalid_argument(format!("vectors for {key:?}: {msg}")))
    }
}

#[async_trait]
impl PageEncoder for PrecomputedEncoder {
    async fn encode_images(&self, images: &[PageImage]) -> Result<Vec<PageEmbedding>> {
        images
            .iter()
            .map(|image| {
                let key = image.key();
                self.pages.get(&key).cloned().ok_or_else(|| {
                    PageSiftError::encoding(format!("no precomputed embedding for page {key}"))
                })
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl QueryEncoder for PrecomputedEncoder {
    async fn encode_query(&self, query: &str) -> Result<QueryVectors> {
        self.queries.get(query).cloned().ok_or_else(|| {
            PageSiftError::encoding(format!("no precomputed vectors for query {query:?}"))
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}
