//! Page embedding index and late-interaction retrieval.
//!
//! # Module Structure
//!
//! - `page`: multi-vector data type shared by pages and queries
//! - `store` / `metadata`: the two persisted, positionally aligned artifacts
//! - `manifest`: generation bookkeeping and publication
//! - `index`: the validated in-memory pairing served to queries
//! - `search`: MaxSim scoring and top-k ranking
//! - `builder`: the offline indexing pipeline

pub mod builder;
pub mod index;
pub mod manifest;
pub mod metadata;
pub mod page;
pub mod search;
pub mod store;

pub use self::index::{EmbeddingIndex, IndexStats};
pub use self::metadata::{MetadataCatalog, PageMetadata};
pub use self::page::{MultiVector, PageEmbedding, QueryVectors};
pub use self::store::EmbeddingStore;
