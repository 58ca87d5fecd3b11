//! Configuration for [`PageRetriever`](super::PageRetriever).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PageSiftError, Result};
use crate::storage::StorageConfig;
use crate::vector::search::RetrievalConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Directory holding the published index.
    pub index_dir: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Number of hits returned when the caller does not ask for a count.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

fn default_top_k() -> usize {
    5
}

impl RetrieverConfig {
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            storage: StorageConfig::default(),
            retrieval: RetrievalConfig::default(),
            default_top_k: default_top_k(),
        }
    }

    /// Read a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_top_k == 0 {
            return Err(PageSiftError::invalid_config("default_top_k must be at least 1"));
        }
        self.retrieval.validate()
    }
}
