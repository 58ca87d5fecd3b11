//! Document rasterization collaborator.

use std::path::{Path, PathBuf};

use crate::embedding::encoder::PageImage;
use crate::error::{PageSiftError, Result};

/// Splits a document into page images.
pub trait Rasterizer: Send + Sync {
    /// Rasterize every page of `document`, in page order.
    fn rasterize(&self, document: &Path) -> Result<Vec<PageImage>>;
}

/// File name of the image for the zero-based page `page_index` of `document`:
/// `<stem>_page<index>.jpg`.
pub fn page_image_name(document: &Path, page_index: usize) -> String {
    let stem = document
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{stem}_page{page_index}.jpg")
}

/// Lazily rasterize `documents` in order, yielding their pages one document
/// at a time.
///
/// Documents that fail to rasterize are logged and skipped.
pub fn rasterized_pages<'a, R, I>(rasterizer: &'a R, documents: I) -> impl Iterator<Item = PageImage> + 'a
where
    R: Rasterizer + ?Sized,
    I: IntoIterator<Item = PathBuf>,
    I::IntoIter: 'a,
{
    documents
        .into_iter()
        .flat_map(move |document| match rasterizer.rasterize(&document) {
            Ok(pages) => {
                log::info!("Rasterized {} ({} pages)", document.display(), pages.len());
                pages
            }
            Err(e) => {
                log::error!("Failed to rasterize {}: {e}", document.display());
                Vec::new()
            }
        })
}

/// Finds pages that were already rasterized into a directory, named as by
/// [`page_image_name`].
#[derive(Debug, Clone)]
pub struct ImageDirectoryRasterizer {
    directory: PathBuf,
}

impl ImageDirectoryRasterizer {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

impl Rasterizer for ImageDirectoryRasterizer {
    fn rasterize(&self, document: &Path) -> Result<Vec<PageImage>> {
        let mut pages = Vec::new();
        loop {
            let image_path = self.directory.join(page_image_name(document, pages.len()));
            if !image_path.is_file() {
                break;
            }
            let page_number = pages.len() as u32 + 1;
            pages.push(PageImage::from_path(document, page_number, image_path));
        }

        if pages.is_empty() {
            return Err(PageSiftError::storage(format!(
                "no page images for {} in {}",
                document.display(),
                self.directory.display()
            )));
        }
        Ok(pages)
    }
}
