use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;

use pagesift::embedding::{PageEncoder, PageImage, PrecomputedEncoder};
use pagesift::error::{PageSiftError, Result};
use pagesift::storage::{FileStorage, Storage, StorageConfig};
use pagesift::vector::builder::{FailurePolicy, IndexBuilder, IndexBuilderConfig};
use pagesift::vector::{EmbeddingIndex, PageEmbedding};

/// Serves precomputed page vectors, failing any batch that holds `fail_on`.
struct FlakyEncoder {
    inner: PrecomputedEncoder,
    fail_on: Option<String>,
    calls: AtomicUsize,
}

impl FlakyEncoder {
    /// Page `n` of `document` is embedded as `[[n, 1], [1, n]]`.
    fn new(document: &str, pages: u32, fail_on: Option<u32>) -> Self {
        let mut inner = PrecomputedEncoder::new(2).with_name("flaky");
        for image in page_images(document, pages) {
            let n = image.page_number as f32;
            inner
                .insert_page(image.key(), PageEmbedding::new(vec![n, 1.0, 1.0, n], 2).unwrap())
                .unwrap();
        }
        Self {
            inner,
            fail_on: fail_on.map(|n| format!("{}_page{}.jpg", stem(document), n - 1)),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageEncoder for FlakyEncoder {
    async fn encode_images(&self, images: &[PageImage]) -> Result<Vec<PageEmbedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fail_on) = &self.fail_on
            && images.iter().any(|image| &image.key() == fail_on)
        {
            return Err(PageSiftError::encoding("model server returned 503"));
        }
        self.inner.encode_images(images).await
    }

    fn dimension(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

fn stem(document: &str) -> &str {
    Path::new(document)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap()
}

fn page_images(document: &str, pages: u32) -> Vec<PageImage> {
    (1..=pages)
        .map(|n| PageImage::from_path(document, n, format!("{}_page{}.jpg", stem(document), n - 1)))
        .collect()
}

fn file_storage(dir: &TempDir) -> Arc<dyn Storage> {
    Arc::new(FileStorage::new(dir.path(), StorageConfig::default()).unwrap())
}

fn snapshot_files(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            (
                entry.file_name().to_string_lossy().into_owned(),
                std::fs::read(entry.path()).unwrap(),
            )
        })
        .collect()
}

fn config(policy: FailurePolicy) -> IndexBuilderConfig {
    IndexBuilderConfig {
        batch_size: 2,
        failure_policy: policy,
        ..Default::default()
    }
}

#[tokio::test]
async fn fail_fast_creates_no_files() {
    let dir = TempDir::new().unwrap();
    let encoder = Arc::new(FlakyEncoder::new("report.pdf", 6, Some(3)));
    let builder =
        IndexBuilder::new(file_storage(&dir), encoder.clone(), config(FailurePolicy::FailFast))
            .unwrap();

    let err = builder.build(page_images("report.pdf", 6)).await.unwrap_err();
    assert!(err.is_encoding(), "{err}");
    assert_eq!(encoder.calls(), 2);
    assert!(snapshot_files(dir.path()).is_empty());
}

#[tokio::test]
async fn fail_fast_leaves_published_generation_untouched() {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);

    let healthy = Arc::new(FlakyEncoder::new("old.pdf", 3, None));
    IndexBuilder::new(storage.clone(), healthy, config(FailurePolicy::FailFast))
        .unwrap()
        .build(page_images("old.pdf", 3))
        .await
        .unwrap();
    let before = snapshot_files(dir.path());

    let flaky = Arc::new(FlakyEncoder::new("new.pdf", 6, Some(5)));
    let builder = IndexBuilder::new(storage.clone(), flaky, config(FailurePolicy::FailFast)).unwrap();
    assert!(builder.build(page_images("new.pdf", 6)).await.is_err());

    assert_eq!(snapshot_files(dir.path()), before);
    let index = EmbeddingIndex::open(storage).unwrap();
    assert_eq!(index.generation(), 1);
    assert!(index.all_metadata().iter().all(|m| m.file_path == "old.pdf"));
}

#[tokio::test]
async fn skip_batch_omits_only_the_failed_batch() {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);
    let encoder = Arc::new(FlakyEncoder::new("report.pdf", 6, Some(3)));
    let builder =
        IndexBuilder::new(storage.clone(), encoder, config(FailurePolicy::SkipBatch)).unwrap();

    let report = builder.build(page_images("report.pdf", 6)).await.unwrap();
    assert_eq!(report.batches_total, 3);
    assert_eq!(report.batches_skipped, 1);
    assert_eq!(report.pages_skipped, 2);
    assert_eq!(report.pages_indexed, 4);

    let index = EmbeddingIndex::open(storage).unwrap();
    let numbers: Vec<u32> = index.all_metadata().iter().map(|m| m.page_number).collect();
    assert_eq!(numbers, vec![1, 2, 5, 6]);
    // Embeddings stay aligned with their metadata.
    for (page, metadata) in index.pages().iter().zip(index.all_metadata()) {
        assert_eq!(page.as_slice()[0], metadata.page_number as f32);
    }
}

#[tokio::test]
async fn concurrent_skip_batch_keeps_alignment() {
    let storage: Arc<dyn Storage> = Arc::new(pagesift::storage::MemoryStorage::new());
    let encoder = Arc::new(FlakyEncoder::new("report.pdf", 11, Some(8)));
    let builder = IndexBuilder::new(
        storage.clone(),
        encoder,
        IndexBuilderConfig {
            batch_size: 3,
            failure_policy: FailurePolicy::SkipBatch,
            max_concurrent_batches: 4,
            ..Default::default()
        },
    )
    .unwrap();

    builder.build(page_images("report.pdf", 11)).await.unwrap();
    let index = EmbeddingIndex::open(storage).unwrap();
    let numbers: Vec<u32> = index.all_metadata().iter().map(|m| m.page_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6, 10, 11]);
    for (page, metadata) in index.pages().iter().zip(index.all_metadata()) {
        assert_eq!(page.as_slice()[3], metadata.page_number as f32);
    }
}

#[tokio::test]
async fn interrupted_build_resumes_from_checkpoint() {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);
    let checkpointed = IndexBuilderConfig {
        batch_size: 2,
        checkpoint: true,
        ..Default::default()
    };

    let flaky = Arc::new(FlakyEncoder::new("report.pdf", 7, Some(5)));
    let builder = IndexBuilder::new(storage.clone(), flaky, checkpointed.clone()).unwrap();
    assert!(builder.build(page_images("report.pdf", 7)).await.is_err());
    assert!(dir.path().join("checkpoint.json").exists());
    assert!(!dir.path().join("manifest.json").exists());

    let healthy = Arc::new(FlakyEncoder::new("report.pdf", 7, None));
    let resume = IndexBuilderConfig {
        resume: true,
        ..checkpointed
    };
    let builder = IndexBuilder::new(storage.clone(), healthy.clone(), resume).unwrap();
    let report = builder.build(page_images("report.pdf", 7)).await.unwrap();

    assert_eq!(report.batches_total, 4);
    assert_eq!(report.batches_resumed, 2);
    assert_eq!(healthy.calls(), 2);
    assert_eq!(report.pages_indexed, 7);

    let index = EmbeddingIndex::open(storage.clone()).unwrap();
    for (page, metadata) in index.pages().iter().zip(index.all_metadata()) {
        assert_eq!(page.as_slice()[0], metadata.page_number as f32);
    }
    let leftovers: Vec<String> = storage
        .list_files()
        .unwrap()
        .into_iter()
        .filter(|name| name.starts_with("checkpoint"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[tokio::test]
async fn resume_ignores_checkpoint_for_different_pages() {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);
    let checkpointed = IndexBuilderConfig {
        batch_size: 2,
        checkpoint: true,
        ..Default::default()
    };

    let flaky = Arc::new(FlakyEncoder::new("old.pdf", 4, Some(3)));
    let builder = IndexBuilder::new(storage.clone(), flaky, checkpointed.clone()).unwrap();
    assert!(builder.build(page_images("old.pdf", 4)).await.is_err());

    let healthy = Arc::new(FlakyEncoder::new("new.pdf", 4, None));
    let resume = IndexBuilderConfig {
        resume: true,
        ..checkpointed
    };
    let builder = IndexBuilder::new(storage.clone(), healthy.clone(), resume).unwrap();
    let report = builder.build(page_images("new.pdf", 4)).await.unwrap();

    assert_eq!(report.batches_resumed, 0);
    assert_eq!(healthy.calls(), 2);
    let index = EmbeddingIndex::open(storage).unwrap();
    assert!(index.all_metadata().iter().all(|m| m.file_path == "new.pdf"));
}
