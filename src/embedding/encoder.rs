//! Encoder traits for page images and query strings.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::vector::page::{PageEmbedding, QueryVectors};

/// Where the pixels of a page image come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// An image file on disk.
    Path(PathBuf),
    /// Encoded image bytes held in memory.
    Bytes(Arc<[u8]>),
}

/// One rasterized page of a source document.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    /// The document the page belongs to.
    pub document_path: PathBuf,
    /// 1-based page number within the document.
    pub page_number: u32,
    pub image: ImageSource,
}

impl PageImage {
    pub fn from_path(
        document_path: impl Into<PathBuf>,
        page_number: u32,
        image_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            document_path: document_path.into(),
            page_number,
            image: ImageSource::Path(image_path.into()),
        }
    }

    pub fn from_bytes(document_path: impl Into<PathBuf>, page_number: u32, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            document_path: document_path.into(),
            page_number,
            image: ImageSource::Bytes(bytes.into()),
        }
    }

    /// File name of the page image, if it lives on disk.
    pub fn image_name(&self) -> Option<String> {
        match &self.image {
            ImageSource::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            ImageSource::Bytes(_) => None,
        }
    }

    /// A key identifying this page: the image file name when there is one,
    /// otherwise `<document>#<page_number>`.
    pub fn key(&self) -> String {
        self.image_name()
            .unwrap_or_else(|| document_page_key(&self.document_path, self.page_number))
    }
}

/// The fallback key of page `page_number` of `document`.
pub fn document_page_key(document: &Path, page_number: u32) -> String {
    format!("{}#{page_number}", document.display())
}

/// Turns page images into multi-vector embeddings.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use pagesift::embedding::{PageEncoder, PageImage};
/// use pagesift::error::Result;
/// use pagesift::vector::page::PageEmbedding;
///
/// struct ConstantEncoder;
///
/// #[async_trait]
/// impl PageEncoder for ConstantEncoder {
///     async fn encode_images(&self, images: &[PageImage]) -> Result<Vec<PageEmbedding>> {
///         Ok(images
///             .iter()
///             .filter_map(|_| PageEmbedding::new(vec![1.0, 0.0, 0.0, 1.0], 2))
///             .collect())
///     }
///
///     fn dimension(&self) -> usize {
///         2
///     }
/// }
/// ```
#[async_trait]
pub trait PageEncoder: Send + Sync {
    /// Encode a batch of page images.
    ///
    /// Must return exactly one embedding per image, in input order. Each
    /// embedding needs at least one vector of length [`dimension`](Self::dimension)
    /// with finite values; the index builder rejects anything else.
    async fn encode_images(&self, images: &[PageImage]) -> Result<Vec<PageEmbedding>>;

    /// Length of every produced vector.
    fn dimension(&self) -> usize;

    /// Name of the encoder, recorded in the index manifest.
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Turns query strings into query vector sets.
#[async_trait]
pub trait QueryEncoder: Send + Sync {
    /// Encode one query string.
    async fn encode_query(&self, query: &str) -> Result<QueryVectors>;

    /// Length of every produced vector.
    fn dimension(&self) -> usize;

    fn name(&self) -> &str {
        "unknown"
    }
}
