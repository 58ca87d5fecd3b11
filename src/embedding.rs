//! Encoder and rasterizer collaborators.
//!
//! pagesift does not run neural models itself. Page images are turned into
//! multi-vector embeddings by a [`PageEncoder`], query strings by a
//! [`QueryEncoder`], and documents into page images by a [`Rasterizer`].
//! Implement these traits to plug a model or service into the index
//! builder and the retriever.
//!
//! [`PrecomputedEncoder`] serves vectors that were computed elsewhere, which
//! is what the command-line tool and the tests use.

pub mod encoder;
pub mod precomputed;
pub mod rasterizer;

pub use encoder::{ImageSource, PageEncoder, PageImage, QueryEncoder};
pub use precomputed::PrecomputedEncoder;
pub use rasterizer::{ImageDirectoryRasterizer, Rasterizer, page_image_name, rasterized_pages};
