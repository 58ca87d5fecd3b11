//! Command implementations for the pagesift CLI.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::embedding::{PageImage, PrecomputedEncoder, page_image_name};
use crate::error::{PageSiftError, Result};
use crate::retriever::{PageRetriever, RetrieverConfig};
use crate::storage::{FileStorage, Storage, StorageConfig, temp_file_target};
use crate::vector::builder::checkpoint::CHECKPOINT_STATE_FILE;
use crate::vector::builder::{FailurePolicy, IndexBuilder, IndexBuilderConfig};
use crate::vector::index::EmbeddingIndex;
use crate::vector::manifest::{IndexManifest, MANIFEST_FILE};
use crate::vector::page::MultiVector;
use crate::vector::search::{RetrievalConfig, ScoreNormalization};

/// Settings read from `--config`. Command line flags override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub builder: IndexBuilderConfig,
    pub retrieval: RetrievalConfig,
    pub storage: StorageConfig,
    pub default_top_k: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            builder: IndexBuilderConfig::default(),
            retrieval: RetrievalConfig::default(),
            storage: StorageConfig::default(),
            default_top_k: 5,
        }
    }
}

/// One line of a pages file.
#[derive(Debug, Clone, Deserialize)]
struct PageRecord {
    file_path: String,
    page_number: u32,
    #[serde(default)]
    image_file: Option<String>,
    vectors: Vec<Vec<f32>>,
}

/// Execute a CLI command.
pub fn execute_command(args: PageSiftArgs) -> Result<()> {
    match &args.command {
        Command::Build(build_args) => build_index(build_args.clone(), &args),
        Command::Search(search_args) => search_index(search_args.clone(), &args),
        Command::Stats(stats_args) => show_stats(stats_args.clone(), &args),
        Command::Validate(validate_args) => validate_index(validate_args.clone(), &args),
    }
}

fn load_config(cli_args: &PageSiftArgs) -> Result<CliConfig> {
    match &cli_args.config {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            let text = std::fs::read_to_string(path)?;
            let config: CliConfig = serde_json::from_str(&text)?;
            config.builder.validate()?;
            config.retrieval.validate()?;
            Ok(config)
        }
        None => Ok(CliConfig::default()),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}

/// Build an index from a pages file.
fn build_index(args: BuildArgs, cli_args: &PageSiftArgs) -> Result<()> {
    let config = load_config(cli_args)?;

    let mut builder_config = config.builder;
    if let Some(batch_size) = args.batch_size {
        builder_config.batch_size = batch_size;
    }
    if args.skip_failed_batches {
        builder_config.failure_policy = FailurePolicy::SkipBatch;
    }
    if let Some(workers) = args.workers {
        builder_config.max_concurrent_batches = if workers == 0 {
            num_cpus::get()
        } else {
            workers
        };
    }
    builder_config.checkpoint |= args.checkpoint;
    builder_config.resume |= args.resume;

    let records = read_page_records(&args.pages_file)?;
    let (encoder, pages) = precomputed_pages(records, &args.pages_file)?;
    log::info!(
        "Building index at {} from {} pages ({} with vectors)",
        args.index_path.display(),
        pages.len(),
        encoder.page_count()
    );

    let storage = Arc::new(FileStorage::new(&args.index_path, config.storage)?);
    let builder = IndexBuilder::new(storage, Arc::new(encoder), builder_config)?;
    let report = runtime()?.block_on(builder.build(pages))?;

    let result = BuildResult {
        path: args.index_path.display().to_string(),
        report,
    };
    output_result("Index built", &result, cli_args)
}

fn read_page_records(path: &Path) -> Result<Vec<PageRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            PageSiftError::invalid_argument(format!("{}:{}: {e}", path.display(), line_no + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Register each record's vectors with an encoder and list its page image.
///
/// Records whose vectors cannot form a page embedding are still listed, so
/// the batch holding them fails to encode and the failure policy decides
/// what happens to it.
fn precomputed_pages(
    records: Vec<PageRecord>,
    source: &Path,
) -> Result<(PrecomputedEncoder, Vec<PageImage>)> {
    let dimension = records
        .iter()
        .find_map(|record| record.vectors.first().map(Vec::len).filter(|&len| len > 0))
        .ok_or_else(|| {
            PageSiftError::invalid_argument(format!("no page vectors in {}", source.display()))
        })?;

    let mut encoder = PrecomputedEncoder::new(dimension);
    let mut pages = Vec::with_capacity(records.len());
    for record in records {
        let image_file = record.image_file.unwrap_or_else(|| {
            page_image_name(
                Path::new(&record.file_path),
                (record.page_number as usize).saturating_sub(1),
            )
        });
        let image = PageImage::from_path(&record.file_path, record.page_number, image_file);

        match MultiVector::from_vectors(&record.vectors) {
            Some(embedding) => {
                if let Err(e) = encoder.insert_page(image.key(), embedding) {
                    log::warn!("Page {} will not encode: {e}", image.key());
                }
            }
            None => log::warn!(
                "Page {} will not encode: vectors are empty or of unequal length",
                image.key()
            ),
        }
        pages.push(image);
    }
    Ok((encoder, pages))
}

/// Rank the pages of an index against query vectors read from a file.
fn search_index(args: SearchArgs, cli_args: &PageSiftArgs) -> Result<()> {
    let config = load_config(cli_args)?;

    let text = std::fs::read_to_string(&args.query_vectors)?;
    let vectors: Vec<Vec<f32>> = serde_json::from_str(&text)?;
    let query = MultiVector::from_vectors(&vectors).ok_or_else(|| {
        PageSiftError::invalid_argument(format!(
            "{} holds no vectors or vectors of unequal length",
            args.query_vectors.display()
        ))
    })?;

    let query_key = args.query_vectors.display().to_string();
    let mut encoder = PrecomputedEncoder::new(query.dimension()).with_name("query-file");
    encoder.insert_query(&query_key, query)?;

    let mut retriever_config = RetrieverConfig::new(&args.index_path);
    retriever_config.storage = config.storage;
    retriever_config.retrieval = config.retrieval;
    retriever_config.default_top_k = config.default_top_k;
    if args.normalize {
        retriever_config.retrieval.normalization = ScoreNormalization::QueryLength;
    }

    let retriever = PageRetriever::open(retriever_config, Arc::new(encoder))?;
    let top_k = args.limit.unwrap_or(retriever.default_top_k());

    let start = Instant::now();
    let hits = runtime()?.block_on(retriever.search(&query_key, top_k))?;
    let duration = start.elapsed();

    let results = SearchResults {
        total_hits: hits.len(),
        hits,
        generation: retriever.snapshot().generation(),
        duration_ms: duration.as_millis() as u64,
    };
    output_result("Search results", &results, cli_args)
}

/// Show statistics of the published index.
fn show_stats(args: StatsArgs, cli_args: &PageSiftArgs) -> Result<()> {
    let config = load_config(cli_args)?;
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(&args.index_path, config.storage)?);

    let manifest = IndexManifest::load(storage.as_ref())?;
    let index = EmbeddingIndex::open(storage.clone())?;

    let mut index_size_bytes = 0;
    for name in [
        MANIFEST_FILE,
        manifest.embeddings_file.as_str(),
        manifest.metadata_file.as_str(),
    ] {
        index_size_bytes += storage.file_size(name)?;
    }

    let report = IndexStatsReport {
        path: args.index_path.display().to_string(),
        generation: manifest.generation,
        encoder: manifest.encoder,
        created_at: manifest.created_at.to_rfc3339(),
        index_size_bytes,
        stats: index.stats(),
    };
    output_result("Index statistics", &report, cli_args)
}

/// Load the published index with every integrity check.
fn validate_index(args: ValidateArgs, cli_args: &PageSiftArgs) -> Result<()> {
    let config = load_config(cli_args)?;
    let mut report = ValidationReport {
        path: args.index_path.display().to_string(),
        valid: false,
        generation: None,
        page_count: 0,
        vector_count: 0,
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    match FileStorage::open(&args.index_path, config.storage) {
        Ok(storage) => check_index(Arc::new(storage), &mut report),
        Err(e) => report.errors.push(e.to_string()),
    }
    report.valid = report.errors.is_empty();

    output_result("Index validation", &report, cli_args)?;
    if report.valid {
        Ok(())
    } else {
        Err(PageSiftError::consistency(format!(
            "index at {} failed validation",
            args.index_path.display()
        )))
    }
}

fn check_index(storage: Arc<dyn Storage>, report: &mut ValidationReport) {
    let manifest = match IndexManifest::load(storage.as_ref()) {
        Ok(manifest) => manifest,
        Err(e) => {
            report.errors.push(e.to_string());
            return;
        }
    };
    report.generation = Some(manifest.generation);

    match EmbeddingIndex::open(storage.clone()) {
        Ok(index) => {
            report.page_count = index.len();
            report.vector_count = index.vector_count();
        }
        Err(e) => report.errors.push(e.to_string()),
    }

    let files = match storage.list_files() {
        Ok(files) => files,
        Err(e) => {
            report.errors.push(e.to_string());
            return;
        }
    };
    for name in files {
        if name == MANIFEST_FILE || name == manifest.embeddings_file || name == manifest.metadata_file {
            continue;
        }
        if let Some(target) = temp_file_target(&name) {
            report
                .warnings
                .push(format!("{name} is an unfinished write of {target}"));
        } else if name == CHECKPOINT_STATE_FILE {
            report
                .warnings
                .push("an interrupted build left a checkpoint behind".to_string());
        } else if name.starts_with("embeddings-") || name.starts_with("metadata-") {
            report.warnings.push(format!("{name} does not belong to the published generation"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn run(args: &[&str]) -> Result<()> {
        let mut argv = vec!["pagesift", "-q", "--format", "json"];
        argv.extend_from_slice(args);
        execute_command(PageSiftArgs::try_parse_from(argv).unwrap())
    }

    fn write_pages(dir: &TempDir, lines: &[&str]) -> PathBuf {
        let path = dir.path().join("pages.jsonl");
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    #[test]
    fn test_build_validate_and_search() {
        let dir = TempDir::new().unwrap();
        let index_dir = dir.path().join("index");
        let pages = write_pages(
            &dir,
            &[
                r#"{"file_path": "a.pdf", "page_number": 1, "vectors": [[1.0, 0.0], [0.0, 1.0]]}"#,
                "",
                r#"{"file_path": "a.pdf", "page_number": 2, "vectors": [[0.5, 0.5]]}"#,
            ],
        );
        let index = index_dir.to_str().unwrap();

        run(&["build", index, pages.to_str().unwrap(), "--batch-size", "1"]).unwrap();
        run(&["validate", index]).unwrap();
        run(&["stats", index]).unwrap();

        let storage = Arc::new(FileStorage::open(&index_dir, StorageConfig::default()).unwrap());
        let opened = EmbeddingIndex::open(storage).unwrap();
        assert_eq!(opened.len(), 2);
        assert_eq!(
            opened.metadata(0).unwrap().image_file.as_deref(),
            Some("a_page0.jpg")
        );

        let query = dir.path().join("query.json");
        std::fs::write(&query, "[[1.0, 0.0]]").unwrap();
        run(&["search", index, "--query-vectors", query.to_str().unwrap(), "--limit", "1"]).unwrap();

        let wrong_dimension = dir.path().join("wide.json");
        std::fs::write(&wrong_dimension, "[[1.0, 0.0, 0.0]]").unwrap();
        let err = run(&["search", index, "--query-vectors", wrong_dimension.to_str().unwrap()])
            .unwrap_err();
        assert!(err.is_encoding());
    }

    #[test]
    fn test_build_skips_unencodable_batch() {
        let dir = TempDir::new().unwrap();
        let index_dir = dir.path().join("index");
        let pages = write_pages(
            &dir,
            &[
                r#"{"file_path": "a.pdf", "page_number": 1, "vectors": [[1.0, 0.0]]}"#,
                r#"{"file_path": "b.pdf", "page_number": 1, "vectors": [[1.0, 0.0, 0.0]]}"#,
                r#"{"file_path": "c.pdf", "page_number": 1, "vectors": [[0.0, 1.0]]}"#,
            ],
        );
        let index = index_dir.to_str().unwrap();
        let pages = pages.to_str().unwrap();

        assert!(run(&["build", index, pages, "--batch-size", "1"]).unwrap_err().is_encoding());
        assert!(!index_dir.join(MANIFEST_FILE).exists());

        run(&["build", index, pages, "--batch-size", "1", "--skip-failed-batches"]).unwrap();
        let storage = Arc::new(FileStorage::open(&index_dir, StorageConfig::default()).unwrap());
        let opened = EmbeddingIndex::open(storage).unwrap();
        let files: Vec<_> = opened.all_metadata().iter().map(|m| m.file_path.as_str()).collect();
        assert_eq!(files, vec!["a.pdf", "c.pdf"]);
    }

    #[test]
    fn test_validate_missing_index() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        assert!(run(&["validate", missing.to_str().unwrap()]).is_err());
    }

    #[test]
    fn test_validate_warns_about_unfinished_writes() {
        use crate::storage::MemoryStorage;
        use crate::vector::metadata::PageMetadata;
        use crate::vector::page::PageEmbedding;

        let memory = Arc::new(MemoryStorage::new());
        let pages = vec![PageEmbedding::new(vec![1.0, 0.0], 2).unwrap()];
        let mut index = EmbeddingIndex::new(2, pages, vec![PageMetadata::new("a.pdf", 1)]).unwrap();
        index.persist(memory.clone(), "test").unwrap();
        memory.put_file("embeddings-2.bin.c4.tmp", vec![0]);

        let mut report = ValidationReport {
            path: "index".to_string(),
            valid: false,
            generation: None,
            page_count: 0,
            vector_count: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        };
        check_index(memory, &mut report);

        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.generation, Some(1));
        assert_eq!(
            report.warnings,
            vec!["embeddings-2.bin.c4.tmp is an unfinished write of embeddings-2.bin"]
        );
    }

    #[test]
    fn test_malformed_pages_file() {
        let dir = TempDir::new().unwrap();
        let pages = write_pages(&dir, &["{not json"]);
        let index = dir.path().join("index");
        let err = run(&["build", index.to_str().unwrap(), pages.to_str().unwrap()]).unwrap_err();
        assert!(err.to_string().contains("pages.jsonl:1"), "{err}");
    }

    #[test]
    fn test_config_file_defaults() {
        let config: CliConfig =
            serde_json::from_str(r#"{"builder": {"batch_size": 4}, "default_top_k": 3}"#).unwrap();
        assert_eq!(config.builder.batch_size, 4);
        assert_eq!(config.builder.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.retrieval, RetrievalConfig::default());
        assert_eq!(config.default_top_k, 3);
    }
}
