//! Per-batch build checkpoints.
//!
//! Each encoded batch is stored as `checkpoint-<batch>.bin` (embeddings) and
//! `checkpoint-<batch>.json` (metadata). `checkpoint.json` records the batch
//! size and which batches are complete; a batch only counts once both of its
//! files are in place.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{PageSiftError, Result};
use crate::storage::{Storage, temp_file_target, write_atomically};
use crate::vector::metadata::{MetadataCatalog, PageMetadata};
use crate::vector::page::PageEmbedding;
use crate::vector::store::EmbeddingStore;

pub const CHECKPOINT_STATE_FILE: &str = "checkpoint.json";
const CHECKPOINT_PREFIX: &str = "checkpoint-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CheckpointState {
    batch_size: usize,
    batches_completed: BTreeSet<usize>,
}

/// Checkpoints of one build.
#[derive(Debug)]
pub struct BuildCheckpoint {
    storage: Arc<dyn Storage>,
    state: Mutex<CheckpointState>,
}

impl BuildCheckpoint {
    /// Open the checkpoint of a build using `batch_size`.
    ///
    /// With `resume`, batches recorded by an earlier build with the same batch
    /// size are kept. Otherwise, or if the batch size differs, any existing
    /// checkpoint is discarded.
    pub fn open(storage: Arc<dyn Storage>, batch_size: usize, resume: bool) -> Result<Self> {
        let previous = if resume {
            Self::read_state(storage.as_ref())?
        } else {
            None
        };

        let state = match previous {
            Some(state) if state.batch_size == batch_size => {
                log::info!(
                    "Resuming build: {} batches already checkpointed",
                    state.batches_completed.len()
                );
                state
            }
            other => {
                if let Some(state) = other {
                    log::warn!(
                        "Discarding checkpoint made with batch size {} (now {batch_size})",
                        state.batch_size
                    );
                }
                let checkpoint = Self {
                    storage,
                    state: Mutex::new(CheckpointState {
                        batch_size,
                        batches_completed: BTreeSet::new(),
                    }),
                };
                checkpoint.clear()?;
                return Ok(checkpoint);
            }
        };

        Ok(Self {
            storage,
            state: Mutex::new(state),
        })
    }

    fn read_state(storage: &dyn Storage) -> Result<Option<CheckpointState>> {
        if !storage.file_exists(CHECKPOINT_STATE_FILE) {
            return Ok(None);
        }
        let mut input = storage.open_input(CHECKPOINT_STATE_FILE)?;
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;

        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                log::warn!("Ignoring unreadable {CHECKPOINT_STATE_FILE}: {e}");
                Ok(None)
            }
        }
    }

    fn write_state(&self, state: &CheckpointState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)?;
        write_atomically(self.storage.as_ref(), CHECKPOINT_STATE_FILE, |output| {
            output.write_all(&json)?;
            Ok(())
        })
    }

    fn embeddings_file(batch: usize) -> String {
        format!("{CHECKPOINT_PREFIX}{batch}.bin")
    }

    fn metadata_file(batch: usize) -> String {
        format!("{CHECKPOINT_PREFIX}{batch}.json")
    }

    pub fn contains(&self, batch: usize) -> bool {
        self.state.lock().batches_completed.contains(&batch)
    }

    pub fn completed(&self) -> usize {
        self.state.lock().batches_completed.len()
    }

    /// Load checkpointed batch `batch`, checking it against `dimension`.
    pub fn load_batch(
        &self,
        batch: usize,
        dimension: usize,
    ) -> Result<(Vec<PageEmbedding>, Vec<PageMetadata>)> {
        let stored = EmbeddingStore::new(self.storage.clone()).load(&Self::embeddings_file(batch))?;
        if stored.dimension != dimension {
            return Err(PageSiftError::consistency(format!(
                "checkpointed batch {batch} has dimension {}, expected {dimension}",
                stored.dimension
            )));
        }
        let metadata = MetadataCatalog::new(self.storage.clone()).load(&Self::metadata_file(batch))?;
        MetadataCatalog::validate(&stored.pages, &metadata)?;
        Ok((stored.pages, metadata))
    }

    /// Persist batch `batch` and mark it complete.
    pub fn record_batch(
        &self,
        batch: usize,
        dimension: usize,
        pages: &[PageEmbedding],
        metadata: &[PageMetadata],
    ) -> Result<()> {
        EmbeddingStore::new(self.storage.clone()).save(&Self::embeddings_file(batch), dimension, pages)?;
        MetadataCatalog::new(self.storage.clone()).save(&Self::metadata_file(batch), metadata)?;
        let mut state = self.state.lock();
        state.batches_completed.insert(batch);
        self.write_state(&state)
    }

    /// Remove every checkpoint file, including unfinished writes of one.
    pub fn clear(&self) -> Result<()> {
        for name in self.storage.list_files()? {
            let target = temp_file_target(&name).unwrap_or(&name);
            if target == CHECKPOINT_STATE_FILE || target.starts_with(CHECKPOINT_PREFIX) {
                self.storage.delete_file(&name)?;
            }
        }
        Ok(())
    }
}
