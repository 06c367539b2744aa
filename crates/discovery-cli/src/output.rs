//! Human-readable rendering of reports for the terminal.

use std::collections::BTreeSet;
use std::fmt::Write;

use crossterm::style::Stylize;
use discovery_index::embeddings::EmbeddingHealth;
use discovery_index::search::{SearchResponse, SearchResult, Source};
use discovery_index::staleness::{ChangeKind, StalenessReport};
use discovery_index::tool::ToolOutput;
use discovery_index::vector_store::CollectionInfo;
use discovery_index::IndexStats;

/// Staleness report: verdict, then at most `display_limit` changes.
pub fn render_staleness(report: &StalenessReport, display_limit: usize) -> String {
    let mut out = String::new();

    let Some(reason) = &report.reason else {
        let _ = writeln!(
            out,
            "{} {} files match the manifest",
            "✓ Up to date:".green().bold(),
            report.files_checked
        );
        return out;
    };

    let _ = writeln!(out, "{} {}", "✗ Stale:".red().bold(), reason);
    if report.changes.is_empty() {
        let _ = writeln!(out, "  Run `discovery check --generate` to create a manifest");
        return out;
    }

    let _ = writeln!(
        out,
        "  {} new, {} modified, {} deleted",
        report.count(ChangeKind::New),
        report.count(ChangeKind::Modified),
        report.count(ChangeKind::Deleted)
    );

    for change in report.changes.iter().take(display_limit) {
        let label = match change.kind {
            ChangeKind::New => format!("{:>8}", change.kind.as_str()).green(),
            ChangeKind::Modified => format!("{:>8}", change.kind.as_str()).yellow(),
            ChangeKind::Deleted => format!("{:>8}", change.kind.as_str()).red(),
        };
        let _ = writeln!(out, "  {} {}", label, change.file_path);
    }

    if report.changes.len() > display_limit {
        let _ = writeln!(out, "  ...and {} more", report.changes.len() - display_limit);
    }
    out
}

/// Chunk inventory buckets affected by the changes, and any whose file no
/// longer matches its checksum. Empty when there is nothing to report.
pub fn render_inventory(stale: &BTreeSet<String>, damaged: &[String]) -> String {
    let mut out = String::new();
    if !stale.is_empty() {
        let names: Vec<&str> = stale.iter().map(String::as_str).collect();
        let _ = writeln!(out, "  Stale inventory buckets: {}", names.join(", "));
    }
    if !damaged.is_empty() {
        let _ = writeln!(
            out,
            "  {} {}",
            "Damaged inventory buckets:".yellow().bold(),
            damaged.join(", ")
        );
    }
    out
}

/// Summary printed after an indexing run.
pub fn render_stats(stats: &IndexStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Indexing complete".green().bold());
    let _ = writeln!(
        out,
        "  Files:      {} scanned, {} processed, {} failed",
        stats.files_scanned, stats.files_processed, stats.files_failed
    );
    if stats.files_unchanged > 0 || stats.files_deleted > 0 {
        let _ = writeln!(
            out,
            "              {} unchanged, {} deleted",
            stats.files_unchanged, stats.files_deleted
        );
    }
    let _ = writeln!(
        out,
        "  Chunks:     {} generated, {} skipped as trivial",
        stats.chunks_generated, stats.chunks_skipped
    );
    let _ = writeln!(out, "  Embeddings: {}", stats.embeddings_created);
    let _ = writeln!(out, "  Points:     {}", stats.points_upserted);
    if stats.errors > 0 {
        let _ = writeln!(out, "  {} {}", "Errors:".yellow().bold(), stats.errors);
    } else {
        let _ = writeln!(out, "  Errors:     0");
    }
    let _ = writeln!(out, "  Duration:   {:.1}s", stats.duration_ms as f64 / 1000.0);
    out
}

/// Search tool output for a terminal.
pub fn render_search(output: &ToolOutput) -> String {
    let mut out = String::new();
    match output {
        ToolOutput::Invalid { error, issues } => {
            let _ = writeln!(out, "{} {}", "Error:".red().bold(), error);
            for issue in issues {
                let _ = writeln!(out, "  {}: {}", issue.path, issue.message);
            }
        }
        ToolOutput::Response(SearchResponse::Failure { error, suggestion }) => {
            let _ = writeln!(out, "{} {}", "Error:".red().bold(), error);
            let _ = writeln!(out, "  {}", suggestion);
        }
        ToolOutput::Response(SearchResponse::Success {
            results,
            total_count,
            warning,
        }) => {
            if let Some(warning) = warning {
                let _ = writeln!(out, "{} {}", "Warning:".yellow().bold(), warning);
            }
            if results.is_empty() {
                let _ = writeln!(out, "No results");
                return out;
            }
            for (index, result) in results.iter().enumerate() {
                render_result(&mut out, index + 1, result);
            }
            let _ = writeln!(out, "Showing {} of {} matches", results.len(), total_count);
        }
    }
    out
}

fn render_result(out: &mut String, position: usize, result: &SearchResult) {
    let sources: Vec<&str> = result
        .sources
        .iter()
        .map(|s| match s {
            Source::Lexical => "lexical",
            Source::Vector => "vector",
        })
        .collect();

    let location = format!(
        "{}:{}-{}",
        result.file, result.line_range[0], result.line_range[1]
    );
    let _ = write!(out, "{:>3}. {}", position, location.cyan().bold());
    if let (Some(kind), Some(name)) = (result.kind, result.name.as_deref()) {
        let _ = write!(out, " {} {}", kind.as_str().magenta(), name);
    }
    let _ = writeln!(out, "  [{}] {:.4}", sources.join("+"), result.score);

    for line in result.preview.lines() {
        let _ = writeln!(out, "       {}", line.dim());
    }
}

/// Diagnostics for `discovery health`.
pub fn render_health(
    embedding: &EmbeddingHealth,
    vector_store: &Result<CollectionInfo, String>,
) -> String {
    let mut out = String::new();

    let mark = |ok: bool| if ok { "✓".green() } else { "✗".red() };

    let _ = writeln!(
        out,
        "{} Embedding service: {}",
        mark(embedding.is_healthy()),
        embedding.message
    );
    if !embedding.available_models.is_empty() {
        let _ = writeln!(out, "    models: {}", embedding.available_models.join(", "));
    }

    match vector_store {
        Ok(info) => {
            let _ = writeln!(
                out,
                "{} Vector store: {} points, {} dimensions, {} distance",
                mark(true),
                info.point_count,
                info.dimensions,
                info.distance
            );
        }
        Err(message) => {
            let _ = writeln!(out, "{} Vector store: {}", mark(false), message);
        }
    }
    out
}
