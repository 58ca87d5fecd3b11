//! Per-page descriptive records, positionally aligned with the embedding store.

use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PageSiftError, Result};
use crate::storage::{Storage, write_atomically};
use crate::vector::page::PageEmbedding;

/// Describes the page behind one embedding.
///
/// Records carry no identifier of their own; a record belongs to the
/// embedding at the same position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Path of the source document.
    pub file_path: String,
    /// 1-based page number within the document.
    pub page_number: u32,
    /// Name of the rasterized page image the embedding was computed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_file: Option<String>,
}

impl PageMetadata {
    pub fn new(file_path: impl Into<String>, page_number: u32) -> Self {
        Self {
            file_path: file_path.into(),
            page_number,
            image_file: None,
        }
    }

    pub fn with_image_file(mut self, image_file: impl Into<String>) -> Self {
        self.image_file = Some(image_file.into());
        self
    }

    fn check(&self) -> std::result::Result<(), &'static str> {
        if self.file_path.is_empty() {
            return Err("file_path is empty");
        }
        if self.page_number < 1 {
            return Err("page_number must be at least 1");
        }
        Ok(())
    }
}

/// Reads and writes metadata catalogs as pretty-printed JSON arrays.
#[derive(Debug, Clone)]
pub struct MetadataCatalog {
    storage: Arc<dyn Storage>,
}

impl MetadataCatalog {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Load the records stored under `name`.
    ///
    /// Any malformed record fails the whole load with a storage error naming
    /// its position.
    pub fn load(&self, name: &str) -> Result<Vec<PageMetadata>> {
        let mut input = self.storage.open_input(name)?;
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;

        let raw: Vec<serde_json::Value> = serde_json::from_slice(&bytes)
            .map_err(|e| PageSiftError::storage(format!("{name}: not a JSON array of records: {e}")))?;

        let mut records = Vec::with_capacity(raw.len());
        for (position, value) in raw.into_iter().enumerate() {
            let record: PageMetadata = serde_json::from_value(value).map_err(|e| {
                PageSiftError::storage(format!("{name}: malformed record at position {position}: {e}"))
            })?;
            record.check().map_err(|msg| {
                PageSiftError::storage(format!("{name}: malformed record at position {position}: {msg}"))
            })?;
            records.push(record);
        }

        log::debug!("Loaded {} metadata records from {name}", records.len());
        Ok(records)
    }

    /// Atomically write `records` under `name`.
    pub fn save(&self, name: &str, records: &[PageMetadata]) -> Result<()> {
        for (position, record) in records.iter().enumerate() {
            record.check().map_err(|msg| {
                PageSiftError::invalid_argument(format!("record at position {position}: {msg}"))
            })?;
        }

        let json = serde_json::to_vec_pretty(records)?;
        write_atomically(self.storage.as_ref(), name, |output| {
            output.write_all(&json)?;
            Ok(())
        })?;

        log::debug!("Saved {} metadata records to {name}", records.len());
        Ok(())
    }

    /// Check that embeddings and metadata pair up one to one.
    pub fn validate(embeddings: &[PageEmbedding], metadata: &[PageMetadata]) -> Result<()> {
        if embeddings.len() != metadata.len() {
            return Err(PageSiftError::consistency(format!(
                "{} page embeddings but {} metadata records",
                embeddings.len(),
                metadata.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn catalog() -> (Arc<MemoryStorage>, MetadataCatalog) {
        let storage = Arc::new(MemoryStorage::new());
        (storage.clone(), MetadataCatalog::new(storage))
    }

    #[test]
    fn test_save_and_load() {
        let (storage, catalog) = catalog();
        let records = vec![
            PageMetadata::new("docs/a.pdf", 1).with_image_file("a_page_1.png"),
            PageMetadata::new("docs/a.pdf", 2),
        ];

        catalog.save("metadata.json", &records).unwrap();
        assert_eq!(catalog.load("metadata.json").unwrap(), records);

        let text = String::from_utf8(storage.read_file("metadata.json").unwrap()).unwrap();
        assert!(text.contains("\"page_number\": 2"));
        assert_eq!(text.matches("image_file").count(), 1);
    }

    #[test]
    fn test_malformed_record_names_position() {
        let (storage, catalog) = catalog();
        storage.put_file(
            "metadata.json",
            br#"[{"file_path": "a.pdf", "page_number": 1}, {"file_path": "a.pdf"}]"#.to_vec(),
        );

        let err = catalog.load("metadata.json").unwrap_err();
        assert!(err.is_storage());
        assert!(err.to_string().contains("position 1"), "{err}");
    }

    #[test]
    fn test_invalid_values_rejected_at_load() {
        let (storage, catalog) = catalog();

        storage.put_file("zero.json", br#"[{"file_path": "a.pdf", "page_number": 0}]"#.to_vec());
        let err = catalog.load("zero.json").unwrap_err();
        assert!(err.to_string().contains("page_number"), "{err}");

        storage.put_file("empty.json", br#"[{"file_path": "", "page_number": 3}]"#.to_vec());
        assert!(catalog.load("empty.json").unwrap_err().is_storage());

        storage.put_file("garbage.json", b"{not json".to_vec());
        assert!(catalog.load("garbage.json").unwrap_err().is_storage());
    }

    #[test]
    fn test_missing_catalog() {
        let (_, catalog) = catalog();
        assert!(catalog.load("metadata.json").unwrap_err().is_storage());
    }

    #[test]
    fn test_validate_counts() {
        let pages = vec![PageEmbedding::new(vec![1.0, 0.0], 2).unwrap()];
        let one = vec![PageMetadata::new("a.pdf", 1)];
        let two = vec![PageMetadata::new("a.pdf", 1), PageMetadata::new("a.pdf", 2)];

        assert!(MetadataCatalog::validate(&pages, &one).is_ok());
        assert!(MetadataCatalog::validate(&pages, &two).unwrap_err().is_consistency());
    }
}
