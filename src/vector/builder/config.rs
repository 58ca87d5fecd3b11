//! Configuration for index builds.

use serde::{Deserialize, Serialize};

use crate::error::{PageSiftError, Result};

/// What the builder does when a batch cannot be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the build. Nothing is published.
    #[default]
    FailFast,
    /// Log the failure, leave the batch's pages out of the index and continue.
    SkipBatch,
}

/// Configuration for [`IndexBuilder`](super::IndexBuilder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexBuilderConfig {
    /// Number of page images sent to the encoder per call.
    pub batch_size: usize,

    pub failure_policy: FailurePolicy,

    /// Maximum number of encoder calls in flight at once.
    pub max_concurrent_batches: usize,

    /// Persist every encoded batch so an interrupted build can be resumed.
    pub checkpoint: bool,

    /// Reuse batches checkpointed by an earlier, interrupted build.
    /// Implies `checkpoint`.
    pub resume: bool,
}

impl Default for IndexBuilderConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            failure_policy: FailurePolicy::FailFast,
            max_concurrent_batches: 1,
            checkpoint: false,
            resume: false,
        }
    }
}

impl IndexBuilderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PageSiftError::invalid_config("batch_size must be at least 1"));
        }
        if self.max_concurrent_batches == 0 {
            return Err(PageSiftError::invalid_config(
                "max_concurrent_batches must be at least 1",
            ));
        }
        Ok(())
    }

    /// Whether batches are written to checkpoints.
    pub fn checkpointing(&self) -> bool {
        self.checkpoint || self.resume
    }
}
