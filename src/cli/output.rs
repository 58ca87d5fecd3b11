//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, PageSiftArgs};
use crate::error::Result;
use crate::retriever::PageHit;
use crate::vector::builder::BuildReport;
use crate::vector::index::IndexStats;

/// Result structure for index builds.
#[derive(Debug, Serialize, Deserialize)]
pub struct BuildResult {
    pub path: String,
    pub report: BuildReport,
}

/// Result structure for search operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<PageHit>,
    pub total_hits: usize,
    pub generation: u64,
    pub duration_ms: u64,
}

/// Index statistics together with what the manifest records.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexStatsReport {
    pub path: String,
    pub generation: u64,
    pub encoder: String,
    pub created_at: String,
    pub index_size_bytes: u64,
    pub stats: IndexStats,
}

/// Outcome of a full index load.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationReport {
    pub path: String,
    pub valid: bool,
    pub generation: Option<u64>,
    pub page_count: usize,
    pub vector_count: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &PageSiftArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &PageSiftArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;

    match std::any::type_name::<T>() {
        name if name.ends_with("SearchResults") => output_search_results_human(&value),
        name if name.ends_with("IndexStatsReport") => output_index_stats_human(&value),
        name if name.ends_with("ValidationReport") => output_validation_human(&value),
        _ => output_generic_human(&value, 0),
    }
    Ok(())
}

fn output_search_results_human(value: &serde_json::Value) {
    let Some(obj) = value.as_object() else {
        return;
    };

    println!("Search Results:");
    println!("═══════════════");
    if let Some(hits) = obj.get("hits").and_then(|h| h.as_array()) {
        for (i, hit) in hits.iter().enumerate() {
            println!(
                "{:>3}. {} page {} (score: {:.4})",
                i + 1,
                hit.get("file_path").and_then(|f| f.as_str()).unwrap_or("?"),
                hit.get("page_number").and_then(|p| p.as_u64()).unwrap_or(0),
                hit.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0)
            );
        }
    }
    println!();

    if let Some(total) = obj.get("total_hits").and_then(|t| t.as_u64()) {
        println!("Total hits: {total}");
    }
    if let Some(generation) = obj.get("generation").and_then(|g| g.as_u64()) {
        println!("Index generation: {generation}");
    }
    if let Some(duration) = obj.get("duration_ms").and_then(|d| d.as_u64()) {
        println!("Search time: {duration}ms");
    }
}

fn output_index_stats_human(value: &serde_json::Value) {
    let Some(obj) = value.as_object() else {
        return;
    };

    println!("Index Statistics:");
    println!("════════════════");
    for key in ["path", "generation", "encoder", "created_at", "index_size_bytes"] {
        if let Some(field) = obj.get(key) {
            println!("{}: {}", key.replace('_', " "), display_scalar(field));
        }
    }
    if let Some(stats) = obj.get("stats").and_then(|s| s.as_object()) {
        for (key, field) in stats {
            println!("{}: {}", key.replace('_', " "), display_scalar(field));
        }
    }
}

fn output_validation_human(value: &serde_json::Value) {
    let Some(obj) = value.as_object() else {
        return;
    };

    let valid = obj.get("valid").and_then(|v| v.as_bool()).unwrap_or(false);
    if valid {
        println!("✓ Index is valid");
    } else {
        println!("✗ Index is invalid");
    }
    if let Some(generation) = obj.get("generation").and_then(|g| g.as_u64()) {
        println!("Generation: {generation}");
    }
    if let Some(pages) = obj.get("page_count").and_then(|p| p.as_u64()) {
        println!("Pages: {pages}");
    }
    if let Some(vectors) = obj.get("vector_count").and_then(|v| v.as_u64()) {
        println!("Vectors: {vectors}");
    }
    for (key, label) in [("errors", "Error"), ("warnings", "Warning")] {
        if let Some(items) = obj.get(key).and_then(|e| e.as_array()) {
            for item in items {
                println!("{label}: {}", display_scalar(item));
            }
        }
    }
}

fn output_generic_human(value: &serde_json::Value, depth: usize) {
    let indent = "  ".repeat(depth);
    match value {
        serde_json::Value::Object(obj) => {
            for (key, field) in obj {
                if field.is_object() {
                    println!("{indent}{}:", key.replace('_', " "));
                    output_generic_human(field, depth + 1);
                } else {
                    println!("{indent}{}: {}", key.replace('_', " "), display_scalar(field));
                }
            }
        }
        other => println!("{indent}{}", display_scalar(other)),
    }
}

fn display_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{f:.2}"),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &PageSiftArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}
