//! Offline index construction.
//!
//! [`IndexBuilder`] pulls page images from a lazy iterator in batches, sends
//! each batch to a [`PageEncoder`], and accumulates embeddings and metadata in
//! lockstep. Once every batch is handled the pair is persisted as a new index
//! generation and published through the manifest.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pagesift::embedding::{PageImage, PrecomputedEncoder};
//! use pagesift::storage::{FileStorage, StorageConfig};
//! use pagesift::vector::builder::{IndexBuilder, IndexBuilderConfig};
//!
//! # async fn example() -> pagesift::error::Result<()> {
//! let storage = Arc::new(FileStorage::new("index", StorageConfig::default())?);
//! let encoder = Arc::new(PrecomputedEncoder::new(128));
//! let builder = IndexBuilder::new(storage, encoder, IndexBuilderConfig::default())?;
//!
//! let pages = vec![PageImage::from_path("report.pdf", 1, "pages/report_page0.jpg")];
//! let report = builder.build(pages).await?;
//! println!("indexed {} pages", report.pages_indexed);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::embedding::encoder::{PageEncoder, PageImage};
use crate::error::{PageSiftError, Result};
use crate::storage::Storage;
use crate::vector::index::EmbeddingIndex;
use crate::vector::metadata::PageMetadata;
use crate::vector::page::PageEmbedding;

pub use checkpoint::BuildCheckpoint;
pub use config::{FailurePolicy, IndexBuilderConfig};

/// Summary of a finished build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub pages_indexed: usize,
    pub pages_skipped: usize,
    pub batches_total: usize,
    pub batches_skipped: usize,
    /// Batches taken from a checkpoint instead of being encoded.
    pub batches_resumed: usize,
    pub dimension: usize,
    /// Generation the index was published as.
    pub generation: u64,
    pub elapsed_ms: u64,
}

/// A batch of pages after the encoder has been through it.
enum BatchOutcome {
    Encoded {
        pages: Vec<PageEmbedding>,
        metadata: Vec<PageMetadata>,
    },
    Resumed {
        pages: Vec<PageEmbedding>,
        metadata: Vec<PageMetadata>,
    },
    Failed {
        metadata: Vec<PageMetadata>,
        error: PageSiftError,
    },
}

/// Builds and publishes embedding indexes.
pub struct IndexBuilder {
    storage: Arc<dyn Storage>,
    encoder: Arc<dyn PageEncoder>,
    config: IndexBuilderConfig,
}

impl std::fmt::Debug for IndexBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("storage", &self.storage)
            .field("encoder", &self.encoder.name())
            .field("config", &self.config)
            .finish()
    }
}

impl IndexBuilder {
    pub fn new(
        storage: Arc<dyn Storage>,
        encoder: Arc<dyn PageEncoder>,
        config: IndexBuilderConfig,
    ) -> Result<Self> {
        config.validate()?;
        if encoder.dimension() == 0 {
            return Err(PageSiftError::invalid_argument(format!(
                "encoder {} reports dimension 0",
                encoder.name()
            )));
        }
        Ok(Self {
            storage,
            encoder,
            config,
        })
    }

    pub fn config(&self) -> &IndexBuilderConfig {
        &self.config
    }

    /// Encode `pages` and publish them as a new index generation.
    ///
    /// Batches are consumed in input order regardless of how many encoder
    /// calls run concurrently. Under [`FailurePolicy::FailFast`] the first
    /// failed batch aborts the build; under [`FailurePolicy::SkipBatch`] its
    /// pages are left out. Either way the previously published generation is
    /// untouched unless the whole build succeeds.
    pub async fn build<I>(&self, pages: I) -> Result<BuildReport>
    where
        I: IntoIterator<Item = PageImage>,
    {
        let started = Instant::now();
        let dimension = self.encoder.dimension();

        let checkpoint = if self.config.checkpointing() {
            Some(BuildCheckpoint::open(
                self.storage.clone(),
                self.config.batch_size,
                self.config.resume,
            )?)
        } else {
            None
        };

        log::info!(
            "Building index with encoder {} (dimension {dimension}, batch size {}, {} concurrent batches)",
            self.encoder.name(),
            self.config.batch_size,
            self.config.max_concurrent_batches
        );

        let mut report = BuildReport {
            pages_indexed: 0,
            pages_skipped: 0,
            batches_total: 0,
            batches_skipped: 0,
            batches_resumed: 0,
            dimension,
            generation: 0,
            elapsed_ms: 0,
        };
        let mut all_pages: Vec<PageEmbedding> = Vec::new();
        let mut all_metadata: Vec<PageMetadata> = Vec::new();

        let checkpoint_ref = checkpoint.as_ref();
        let mut outcomes = std::pin::pin!(
            stream::iter(pages)
                .chunks(self.config.batch_size)
                .enumerate()
                .map(|(batch_index, images)| async move {
                    let outcome = self.process_batch(batch_index, images, checkpoint_ref).await;
                    (batch_index, outcome)
                })
                .buffered(self.config.max_concurrent_batches)
        );

        while let Some((batch_index, outcome)) = outcomes.next().await {
            report.batches_total += 1;
            match outcome {
                BatchOutcome::Encoded { pages, metadata } => {
                    log::debug!("Encoded batch {batch_index} ({} pages)", pages.len());
                    if let Some(checkpoint) = checkpoint_ref
                        && let Err(e) = checkpoint.record_batch(batch_index, dimension, &pages, &metadata)
                    {
                        log::warn!("Failed to checkpoint batch {batch_index}: {e}");
                    }
                    report.pages_indexed += pages.len();
                    all_pages.extend(pages);
                    all_metadata.extend(metadata);
                }
                BatchOutcome::Resumed { pages, metadata } => {
                    log::debug!("Reused checkpointed batch {batch_index} ({} pages)", pages.len());
                    report.batches_resumed += 1;
                    report.pages_indexed += pages.len();
                    all_pages.extend(pages);
                    all_metadata.extend(metadata);
                }
                BatchOutcome::Failed { metadata, error } => match self.config.failure_policy {
                    FailurePolicy::FailFast => {
                        log::error!("Batch {batch_index} failed, aborting build: {error}");
                        return Err(error);
                    }
                    FailurePolicy::SkipBatch => {
                        log::warn!(
                            "Skipping batch {batch_index} ({} pages: {}): {error}",
                            metadata.len(),
                            describe_pages(&metadata)
                        );
                        report.batches_skipped += 1;
                        report.pages_skipped += metadata.len();
                    }
                },
            }
        }

        if report.pages_indexed == 0 && report.batches_skipped > 0 {
            return Err(PageSiftError::encoding(format!(
                "all {} batches failed; nothing was published",
                report.batches_skipped
            )));
        }

        let mut index = EmbeddingIndex::new(dimension, all_pages, all_metadata)?;
        let manifest = index.persist(self.storage.clone(), self.encoder.name())?;
        report.generation = manifest.generation;

        if let Some(checkpoint) = &checkpoint
            && let Err(e) = checkpoint.clear()
        {
            log::warn!("Failed to remove build checkpoint: {e}");
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "Published generation {}: {} pages indexed, {} skipped in {} ms",
            report.generation,
            report.pages_indexed,
            report.pages_skipped,
            report.elapsed_ms
        );
        Ok(report)
    }

    /// Encode one batch, or take it from the checkpoint when available.
    async fn process_batch(
        &self,
        batch_index: usize,
        images: Vec<PageImage>,
        checkpoint: Option<&BuildCheckpoint>,
    ) -> BatchOutcome {
        let dimension = self.encoder.dimension();
        let metadata: Vec<PageMetadata> = images.iter().map(page_metadata).collect();

        if let Some(checkpoint) = checkpoint
            && checkpoint.contains(batch_index)
        {
            match checkpoint.load_batch(batch_index, dimension) {
                Ok((pages, stored_metadata)) if stored_metadata == metadata => {
                    return BatchOutcome::Resumed {
                        pages,
                        metadata: stored_metadata,
                    };
                }
                Ok(_) => log::warn!(
                    "Checkpointed batch {batch_index} describes different pages; re-encoding"
                ),
                Err(e) => log::warn!("Cannot reuse checkpointed batch {batch_index}: {e}"),
            }
        }

        if let Err(error) = check_metadata(&metadata) {
            return BatchOutcome::Failed { metadata, error };
        }

        let result = self
            .encoder
            .encode_images(&images)
            .await
            .and_then(|pages| check_encoder_output(&pages, images.len(), dimension).map(|()| pages));

        match result {
            Ok(pages) => BatchOutcome::Encoded { pages, metadata },
            Err(error) => BatchOutcome::Failed { metadata, error },
        }
    }
}

fn page_metadata(image: &PageImage) -> PageMetadata {
    PageMetadata {
        file_path: image.document_path.display().to_string(),
        page_number: image.page_number,
        image_file: image.image_name(),
    }
}

fn check_metadata(metadata: &[PageMetadata]) -> Result<()> {
    for record in metadata {
        if record.file_path.is_empty() || record.page_number < 1 {
            return Err(PageSiftError::invalid_argument(format!(
                "invalid page {}#{}",
                record.file_path, record.page_number
            )));
        }
    }
    Ok(())
}

/// Check encoder output for one batch: one embedding per image, each with at
/// least one finite vector of the encoder's dimension.
fn check_encoder_output(pages: &[PageEmbedding], expected: usize, dimension: usize) -> Result<()> {
    if pages.len() != expected {
        return Err(PageSiftError::encoding(format!(
            "encoder returned {} embeddings for {expected} images",
            pages.len()
        )));
    }
    for (position, page) in pages.iter().enumerate() {
        page.check(dimension).map_err(|msg| {
            PageSiftError::encoding(format!("embedding {position} of batch: {msg}"))
        })?;
    }
    Ok(())
}

fn describe_pages(metadata: &[PageMetadata]) -> String {
    metadata
        .iter()
        .map(|m| format!("{}#{}", m.file_path, m.page_number))
        .collect::<Vec<_>>()
        .join(", ")
}
