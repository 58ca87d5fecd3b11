//! Persistence of per-page multi-vector embeddings.
//!
//! # File format
//!
//! All integers and floats are little-endian.
//!
//! ```text
//! magic        b"PSEM"
//! version      u32   (currently 1)
//! dimension    u32   recorded once for the whole store
//! page_count   u64
//! page_count × {
//!     vector_count  u32
//!     dimension     u32   must equal the header dimension
//!     vector_count × dimension × f32
//! }
//! crc32        u32   over every preceding byte
//! ```

use std::sync::Arc;

use crate::error::{PageSiftError, Result};
use crate::storage::{Storage, StorageOutput, StructReader, StructWriter, write_atomically};
use crate::vector::page::PageEmbedding;

const MAGIC: &[u8; 4] = b"PSEM";
const FORMAT_VERSION: u32 = 1;

/// Embeddings read back from a store.
#[derive(Debug, Clone)]
pub struct StoredEmbeddings {
    /// The dimension recorded in the header.
    pub dimension: usize,
    /// Page embeddings in stored order.
    pub pages: Vec<PageEmbedding>,
}

/// Reads and writes embedding blobs in a [`Storage`].
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    storage: Arc<dyn Storage>,
}

impl EmbeddingStore {
    /// Create a store over the given storage.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Load the embeddings stored under `name`.
    ///
    /// Fails with a storage error if the file is absent, truncated, fails its
    /// checksum or records inconsistent dimensions. A file that passes its
    /// checksum but holds a page without vectors or with non-finite values is
    /// a consistency error.
    pub fn load(&self, name: &str) -> Result<StoredEmbeddings> {
        let input = self.storage.open_input(name)?;
        let size = input.size()?;
        let mut reader = StructReader::new(input, size, name);

        let mut magic = [0u8; 4];
        reader.read_raw(&mut magic)?;
        if &magic != MAGIC {
            return Err(PageSiftError::storage(format!(
                "{name}: not an embedding store (bad magic)"
            )));
        }

        let version = reader.read_u32()?;
        if version != FORMAT_VERSION {
            return Err(PageSiftError::storage(format!(
                "{name}: unsupported format version {version}"
            )));
        }

        let dimension = reader.read_u32()? as usize;
        if dimension == 0 {
            return Err(PageSiftError::storage(format!(
                "{name}: recorded dimension is zero"
            )));
        }

        let page_count = reader.read_u64()?;
        // Each page needs at least its two header fields.
        if page_count > reader.remaining() / 8 {
            return Err(PageSiftError::storage(format!(
                "{name}: declares {page_count} pages but the file is truncated"
            )));
        }

        let mut pages = Vec::with_capacity(page_count as usize);
        for page_index in 0..page_count {
            let vector_count = reader.read_u32()? as usize;
            let entry_dimension = reader.read_u32()? as usize;
            if entry_dimension != dimension {
                return Err(PageSiftError::storage(format!(
                    "{name}: page {page_index} records dimension {entry_dimension}, header records {dimension}"
                )));
            }

            let data = reader.read_f32_vec(vector_count * dimension)?;
            let page = PageEmbedding::new(data, dimension)
                .ok_or_else(|| PageSiftError::internal("page data length not a multiple of dimension"))?;
            pages.push(page);
        }

        // Content is only judged once the bytes are known to be the ones written.
        reader.verify_checksum()?;
        for (page_index, page) in pages.iter().enumerate() {
            page.check(dimension).map_err(|msg| {
                PageSiftError::consistency(format!("{name}: page {page_index}: {msg}"))
            })?;
        }

        log::debug!(
            "Loaded {} page embeddings (dimension {dimension}) from {name}",
            pages.len()
        );
        Ok(StoredEmbeddings { dimension, pages })
    }

    /// Atomically write `pages` under `name`.
    ///
    /// Every page is checked against `dimension` before storage is touched.
    pub fn save(&self, name: &str, dimension: usize, pages: &[PageEmbedding]) -> Result<()> {
        if dimension == 0 || dimension > u32::MAX as usize {
            return Err(PageSiftError::invalid_argument(format!(
                "invalid embedding dimension {dimension}"
            )));
        }
        for (page_index, page) in pages.iter().enumerate() {
            page.check(dimension).map_err(|msg| {
                PageSiftError::consistency(format!("page {page_index}: {msg}"))
            })?;
            if page.len() > u32::MAX as usize {
                return Err(PageSiftError::invalid_argument(format!(
                    "page {page_index} holds too many vectors"
                )));
            }
        }

        write_atomically(self.storage.as_ref(), name, |output| {
            write_pages(output, dimension, pages)
        })?;

        log::debug!("Saved {} page embeddings to {name}", pages.len());
        Ok(())
    }
}

fn write_pages(output: &mut dyn StorageOutput, dimension: usize, pages: &[PageEmbedding]) -> Result<()> {
    let mut writer = StructWriter::new(output);
    writer.write_raw(MAGIC)?;
    writer.write_u32(FORMAT_VERSION)?;
    writer.write_u32(dimension as u32)?;
    writer.write_u64(pages.len() as u64)?;

    for page in pages {
        writer.write_u32(page.len() as u32)?;
        writer.write_u32(dimension as u32)?;
        writer.write_f32_slice(page.as_slice())?;
    }

    writer.finish()?;
    Ok(())
}
