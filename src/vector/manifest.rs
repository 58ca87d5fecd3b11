//! Index manifest and generation bookkeeping.
//!
//! An index directory holds `manifest.json`, which names the embedding store
//! and metadata catalog of the current generation. Writing a new generation
//! never touches the files the manifest points at; the pair only becomes
//! visible once the manifest itself is atomically replaced.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PageSiftError, Result};
use crate::storage::{Storage, temp_file_target, write_atomically};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

const EMBEDDINGS_PREFIX: &str = "embeddings-";
const EMBEDDINGS_SUFFIX: &str = ".bin";
const METADATA_PREFIX: &str = "metadata-";
const METADATA_SUFFIX: &str = ".json";

/// Describes the published generation of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub generation: u64,
    pub dimension: usize,
    pub page_count: usize,
    pub vector_count: usize,
    pub embeddings_file: String,
    pub metadata_file: String,
    /// Name of the encoder that produced the embeddings.
    #[serde(default)]
    pub encoder: String,
    pub created_at: DateTime<Utc>,
}

impl IndexManifest {
    /// Describe generation `generation` using the conventional file names.
    pub fn new(
        generation: u64,
        dimension: usize,
        page_count: usize,
        vector_count: usize,
        encoder: impl Into<String>,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION,
            generation,
            dimension,
            page_count,
            vector_count,
            embeddings_file: embeddings_file_name(generation),
            metadata_file: metadata_file_name(generation),
            encoder: encoder.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether `storage` holds a published index.
    pub fn exists(storage: &dyn Storage) -> bool {
        storage.file_exists(MANIFEST_FILE)
    }

    /// Read the manifest of `storage`.
    pub fn load(storage: &dyn Storage) -> Result<Self> {
        if !storage.file_exists(MANIFEST_FILE) {
            return Err(PageSiftError::storage(format!(
                "{MANIFEST_FILE} not found; no index has been published"
            )));
        }

        let mut input = storage.open_input(MANIFEST_FILE)?;
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;

        let manifest: IndexManifest = serde_json::from_slice(&bytes)
            .map_err(|e| PageSiftError::storage(format!("{MANIFEST_FILE} is malformed: {e}")))?;

        if manifest.version != MANIFEST_VERSION {
            return Err(PageSiftError::storage(format!(
                "{MANIFEST_FILE}: unsupported manifest version {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }

    /// Atomically replace the manifest of `storage` with this one.
    pub fn publish(&self, storage: &dyn Storage) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomically(storage, MANIFEST_FILE, |output| {
            output.write_all(&json)?;
            Ok(())
        })?;
        log::info!(
            "Published index generation {} ({} pages, dimension {})",
            self.generation,
            self.page_count,
            self.dimension
        );
        Ok(())
    }
}

pub fn embeddings_file_name(generation: u64) -> String {
    format!("{EMBEDDINGS_PREFIX}{generation}{EMBEDDINGS_SUFFIX}")
}

pub fn metadata_file_name(generation: u64) -> String {
    format!("{METADATA_PREFIX}{generation}{METADATA_SUFFIX}")
}

/// Parse the generation out of an embeddings or metadata file name.
fn generation_of(file_name: &str) -> Option<u64> {
    let digits = file_name
        .strip_prefix(EMBEDDINGS_PREFIX)
        .and_then(|rest| rest.strip_suffix(EMBEDDINGS_SUFFIX))
        .or_else(|| {
            file_name
                .strip_prefix(METADATA_PREFIX)
                .and_then(|rest| rest.strip_suffix(METADATA_SUFFIX))
        })?;
    digits.parse().ok()
}

/// The generation number a new build should write.
///
/// Always above both the published generation and any generation files left
/// behind by an interrupted build.
pub fn next_generation(storage: &dyn Storage) -> Result<u64> {
    let published = if IndexManifest::exists(storage) {
        IndexManifest::load(storage)?.generation
    } else {
        0
    };
    let on_disk = storage
        .list_files()?
        .iter()
        .filter_map(|name| generation_of(name))
        .max()
        .unwrap_or(0);
    Ok(published.max(on_disk) + 1)
}

/// Remove generation files other than those of `current`, along with
/// unfinished writes of generation files or of the manifest.
///
/// Must only run while no build is writing to the index. Failures are logged
/// and otherwise ignored. Returns the number of files removed.
pub fn remove_superseded(storage: &dyn Storage, current: u64) -> usize {
    let files = match storage.list_files() {
        Ok(files) => files,
        Err(e) => {
            log::warn!("Cannot list index files for cleanup: {e}");
            return 0;
        }
    };

    let mut removed = 0;
    for name in files {
        let superseded = match temp_file_target(&name) {
            Some(target) => target == MANIFEST_FILE || generation_of(target).is_some(),
            None => generation_of(&name).is_some_and(|generation| generation != current),
        };
        if !superseded {
            continue;
        }
        match storage.delete_file(&name) {
            Ok(()) => {
                log::debug!("Removed superseded index file {name}");
                removed += 1;
            }
            Err(e) => log::warn!("Failed to remove superseded index file {name}: {e}"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_publish_and_load() {
        let storage = MemoryStorage::new();
        let manifest = IndexManifest::new(3, 128, 10, 420, "colpali");

        manifest.publish(&storage).unwrap();
        let loaded = IndexManifest::load(&storage).unwrap();

        assert_eq!(loaded, manifest);
        assert_eq!(loaded.embeddings_file, "embeddings-3.bin");
        assert_eq!(loaded.metadata_file, "metadata-3.json");
    }

    #[test]
    fn test_missing_manifest_is_storage_error() {
        let storage = MemoryStorage::new();
        assert!(!IndexManifest::exists(&storage));
        assert!(IndexManifest::load(&storage).unwrap_err().is_storage());
    }

    #[test]
    fn test_malformed_manifest() {
        let storage = MemoryStorage::new();
        storage.put_file(MANIFEST_FILE, b"{\"version\": 1}".to_vec());
        assert!(IndexManifest::load(&storage).unwrap_err().is_storage());
    }

    #[test]
    fn test_generation_parsing() {
        assert_eq!(generation_of("embeddings-12.bin"), Some(12));
        assert_eq!(generation_of("metadata-7.json"), Some(7));
        assert_eq!(generation_of("manifest.json"), None);
        assert_eq!(generation_of("embeddings-x.bin"), None);
        assert_eq!(generation_of("checkpoint-1.bin"), None);
    }

    #[test]
    fn test_next_generation_skips_orphans() {
        let storage = MemoryStorage::new();
        assert_eq!(next_generation(&storage).unwrap(), 1);

        IndexManifest::new(2, 4, 0, 0, "test").publish(&storage).unwrap();
        assert_eq!(next_generation(&storage).unwrap(), 3);

        storage.put_file("embeddings-5.bin", vec![0]);
        assert_eq!(next_generation(&storage).unwrap(), 6);
    }

    #[test]
    fn test_remove_superseded() {
        let storage = MemoryStorage::new();
        for name in [
            "embeddings-1.bin",
            "metadata-1.json",
            "embeddings-2.bin",
            "metadata-2.json",
            "unrelated.txt",
        ] {
            storage.put_file(name, vec![1]);
        }

        assert_eq!(remove_superseded(&storage, 2), 2);
        assert_eq!(
            storage.list_files().unwrap(),
            vec!["embeddings-2.bin", "metadata-2.json", "unrelated.txt"]
        );
    }

    #[test]
    fn test_remove_superseded_reclaims_unfinished_writes() {
        let storage = MemoryStorage::new();
        for name in [
            "embeddings-1.bin.x.tmp",
            "metadata-2.json.0f3c.tmp",
            "manifest.json.abc.tmp",
            "checkpoint.json.d1.tmp",
            "notes.txt",
            "notes.txt.y.tmp",
        ] {
            storage.put_file(name, vec![1]);
        }

        assert_eq!(remove_superseded(&storage, 2), 3);
        assert_eq!(
            storage.list_files().unwrap(),
            vec!["checkpoint.json.d1.tmp", "notes.txt", "notes.txt.y.tmp"]
        );
    }
}
