//! Command-line interface for Discovery.

pub mod output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use discovery_config::DiscoveryConfig;
use discovery_index::chunker::{ChunkerConfig, InventoryManifest};
use discovery_index::lexical::SnippetConfig;
use discovery_index::manifest::{generate_manifest, write_manifest};
use discovery_index::search::{HybridSearcher, SearchConfig, SearchResponse};
use discovery_index::staleness::StalenessDetector;
use discovery_index::tool::{self, ToolOutput};
use discovery_index::vector_store::{QdrantConfig, QdrantStore, VectorStore};
use discovery_index::{
    FileScanner, IndexError, IndexMode, Indexer, IndexerConfig, OllamaConfig, OllamaEmbeddings,
};

#[derive(Parser, Debug)]
#[command(name = "discovery")]
#[command(about = "Source manifests and hybrid code search")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (default: ./discovery.toml when present)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Source root, overriding the configured one
    #[arg(long, value_name = "DIR", global = true)]
    pub root: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compare the source tree with the stored manifest (exit 1 when stale)
    Check {
        /// Write a fresh manifest instead of checking
        #[arg(long)]
        generate: bool,
    },
    /// Build the lexical and vector indexes
    Index {
        /// Reindex only files changed since the last run
        #[arg(long)]
        incremental: bool,
    },
    /// Search indexed code
    Search {
        /// Words, identifiers or a description of the code
        query: String,

        /// Maximum number of results (1-50)
        #[arg(short, long)]
        limit: Option<i64>,

        /// all, function, class, component, hook, interface, type or unknown
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        kind: Option<String>,

        /// Print the raw JSON tool output
        #[arg(long)]
        json: bool,
    },
    /// Show embedding service and vector store status
    Health,
}

/// Parse arguments, run the command and return the process exit code.
pub async fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config =
        DiscoveryConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(root) = &cli.root {
        config.source.root = root.to_string_lossy().into_owned();
    }
    debug!("Configuration: {:?}", config);

    match cli.command {
        Commands::Check { generate } => check(&config, generate),
        Commands::Index { incremental } => index(&config, incremental).await,
        Commands::Search {
            query,
            limit,
            kind,
            json,
        } => search(&config, query, limit, kind, json).await,
        Commands::Health => health(&config).await,
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,discovery={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn scanner(config: &DiscoveryConfig) -> Result<FileScanner> {
    FileScanner::new(config.root_path(), &config.source.include, &config.source.ignore)
        .context("Invalid source globs")
}

fn embeddings(config: &DiscoveryConfig) -> Result<Arc<OllamaEmbeddings>> {
    let provider = OllamaEmbeddings::new(OllamaConfig {
        base_url: config.embedding.base_url.clone(),
        model: config.embedding.model.clone(),
        dimensions: config.embedding.dimensions,
        timeout: Duration::from_secs(config.embedding.timeout_secs),
    })?;
    Ok(Arc::new(provider))
}

fn vector_store(config: &DiscoveryConfig) -> Result<Arc<QdrantStore>> {
    let store = QdrantStore::from_config(&QdrantConfig {
        url: config.vector_store.url.clone(),
        api_key: config.vector_store.api_key.clone(),
        collection_name: config.vector_store.collection.clone(),
        dimensions: config.embedding.dimensions,
        timeout: Duration::from_secs(config.vector_store.timeout_secs),
    })?;
    Ok(Arc::new(store))
}

fn snippet_config(config: &DiscoveryConfig) -> SnippetConfig {
    SnippetConfig {
        start_marker: config.search.snippet_start.clone(),
        end_marker: config.search.snippet_end.clone(),
        tokens: config.search.snippet_tokens,
    }
}

fn check(config: &DiscoveryConfig, generate: bool) -> Result<i32> {
    let scanner = scanner(config)?;
    let manifest_path = config.manifest_path();

    if generate {
        let manifest = generate_manifest(&scanner).context("Failed to scan source tree")?;
        write_manifest(&manifest_path, &manifest)
            .with_context(|| format!("Failed to write manifest to {:?}", manifest_path))?;
        println!(
            "{} {} files recorded in {}",
            "✓ Manifest written:".green().bold(),
            manifest.source_hashes.len(),
            manifest_path.display()
        );
        return Ok(0);
    }

    let report = StalenessDetector::new(scanner, manifest_path)
        .check()
        .context("Failed to scan source tree")?;
    print!("{}", output::render_staleness(&report, config.indexing.display_limit));

    if let Some(inventory) = InventoryManifest::read(&config.inventory_dir()) {
        let stale = inventory.stale_buckets(&report.changes, &config.source.features_root);
        let damaged = inventory.verify(&config.inventory_dir());
        print!("{}", output::render_inventory(&stale, &damaged));
    }
    Ok(report.exit_code())
}

async fn index(config: &DiscoveryConfig, incremental: bool) -> Result<i32> {
    let mode = if incremental {
        IndexMode::Incremental
    } else {
        IndexMode::Fresh
    };

    let mut indexer_config = IndexerConfig::new(config.lexical_path());
    indexer_config.batch_size = config.indexing.batch_size;
    indexer_config.snippet = snippet_config(config);
    indexer_config.chunker = ChunkerConfig {
        min_content_chars: config.indexing.min_chunk_chars,
        features_root: config.source.features_root.clone(),
        include_private: config.source.include_private,
    };
    if config.indexing.write_inventory {
        indexer_config.inventory_dir = Some(config.inventory_dir());
    }
    indexer_config.manifest_path = Some(config.indexed_manifest_path());

    let mut indexer = Indexer::new(
        indexer_config,
        scanner(config)?,
        embeddings(config)?,
        vector_store(config)?,
    )?;

    info!("Indexing {}", config.root_path().display());
    match indexer.run(mode).await {
        Ok(stats) => {
            print!("{}", output::render_stats(&stats));
            Ok(0)
        }
        Err(IndexError::ServiceUnavailable { service, hint }) => {
            eprintln!("{} {} is unavailable", "✗".red().bold(), service);
            eprintln!("  {}", hint);
            Ok(1)
        }
        Err(e) => Err(e).context("Indexing failed"),
    }
}

/// Tool arguments from command-line flags; absent flags are left to the tool's defaults.
fn tool_arguments(query: String, limit: Option<i64>, kind: Option<String>) -> Value {
    let mut args = Map::new();
    args.insert("query".to_string(), json!(query));
    if let Some(limit) = limit {
        args.insert("limit".to_string(), json!(limit));
    }
    if let Some(kind) = kind {
        args.insert("type".to_string(), json!(kind));
    }
    Value::Object(args)
}

async fn search(
    config: &DiscoveryConfig,
    query: String,
    limit: Option<i64>,
    kind: Option<String>,
    as_json: bool,
) -> Result<i32> {
    let searcher = HybridSearcher::with_lexical_path(
        SearchConfig {
            rrf_k: config.search.rrf_k,
            default_limit: config.search.default_limit,
            snippet: snippet_config(config),
            ..Default::default()
        },
        embeddings(config)?,
        vector_store(config)?,
        config.lexical_path(),
    );

    let output = tool::execute(&searcher, &tool_arguments(query, limit, kind)).await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", output::render_search(&output));
    }

    Ok(match output {
        ToolOutput::Response(SearchResponse::Success { .. }) => 0,
        _ => 1,
    })
}

async fn health(config: &DiscoveryConfig) -> Result<i32> {
    let embeddings = embeddings(config)?;
    let store = vector_store(config)?;

    let embedding_health = embeddings.health_details().await;
    let store_status = match store.ping().await {
        Ok(()) => store.collection_info().await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    print!("{}", output::render_health(&embedding_health, &store_status));
    Ok(if embedding_health.is_healthy() && store_status.is_ok() {
        0
    } else {
        1
    })
}
