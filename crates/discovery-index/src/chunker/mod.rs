//! Symbol-level chunking of source files.
//!
//! A [`SymbolExtractor`] yields raw declarations, a [`Classifier`] assigns
//! each one a [`ChunkKind`], and the [`Chunker`] applies the naming,
//! grouping and minimum-content policy on top.

pub mod classify;
pub mod extractor;
pub mod inventory;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use classify::{Classification, Classifier, NamingClassifier, STATEFUL_APIS};
pub use extractor::{DeclKind, Declaration, SymbolExtractor, TreeSitterExtractor};
pub use inventory::{ChunkInventory, InventoryManifest, BUCKETS_DIR, INVENTORY_MANIFEST_FILE};

/// Bucket for files outside any feature directory.
pub const ROOT_BUCKET: &str = "_root";

/// Default minimum trimmed content length for a chunk.
pub const DEFAULT_MIN_CHUNK_CHARS: usize = 20;

/// Errors that can occur during code chunking.
#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("Unsupported file type: {0}")]
    UnsupportedLanguage(String),

    #[error("Failed to parse file: {0}")]
    Parse(String),

    #[error("Failed to load grammar: {0}")]
    Grammar(#[from] tree_sitter::LanguageError),
}

/// Category of a code chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Class,
    Component,
    Hook,
    Interface,
    Type,
    Unknown,
}

impl ChunkKind {
    pub const ALL: [ChunkKind; 7] = [
        Self::Function,
        Self::Class,
        Self::Component,
        Self::Hook,
        Self::Interface,
        Self::Type,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Component => "component",
            Self::Hook => "hook",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown chunk kind '{}'", s))
    }
}

/// Finer category for hooks and components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Binds state through an allow-listed API
    Stateful,
    Presentational,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stateful => "stateful",
            Self::Presentational => "presentational",
        }
    }
}

/// A unit of source code prepared for indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Deterministic id derived from file path, name and kind
    pub id: String,
    pub file_path: String,
    pub kind: ChunkKind,
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub bucket: String,
}

/// Stable chunk id for a symbol.
pub fn chunk_id(file_path: &str, name: &str, kind: ChunkKind) -> String {
    format!("{}:{}:{}", file_path, name, kind.as_str())
}

/// Feature bucket for a relative path.
///
/// The first directory under `features_root` names the bucket; anything else
/// lands in [`ROOT_BUCKET`].
pub fn bucket_for(relative_path: &str, features_root: &str) -> String {
    let root = features_root.trim_matches('/');
    let rest = if root.is_empty() {
        Some(relative_path)
    } else {
        relative_path
            .strip_prefix(root)
            .and_then(|r| r.strip_prefix('/'))
    };

    match rest.and_then(|r| r.split_once('/')) {
        Some((first, _)) if !first.is_empty() => first.to_string(),
        _ => ROOT_BUCKET.to_string(),
    }
}

/// Chunking policy knobs.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Chunks whose trimmed content is shorter are dropped
    pub min_content_chars: usize,
    /// Directory whose children define buckets
    pub features_root: String,
    /// Also chunk non-exported declarations
    pub include_private: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_content_chars: DEFAULT_MIN_CHUNK_CHARS,
            features_root: "src".to_string(),
            include_private: false,
        }
    }
}

/// Chunks for one file plus the number dropped by the content filter.
#[derive(Debug, Clone, Default)]
pub struct ChunkOutcome {
    pub chunks: Vec<Chunk>,
    pub skipped: usize,
}

/// Turns source files into classified, filtered chunks.
pub struct Chunker {
    extractor: Box<dyn SymbolExtractor>,
    classifier: Box<dyn Classifier>,
    config: ChunkerConfig,
}

impl Chunker {
    /// Tree-sitter extraction with the naming classifier.
    pub fn new(config: ChunkerConfig) -> Result<Self, ChunkerError> {
        let extractor = TreeSitterExtractor::new(config.include_private)?;
        Ok(Self::with_strategies(
            Box::new(extractor),
            Box::new(NamingClassifier::default()),
            config,
        ))
    }

    pub fn with_strategies(
        extractor: Box<dyn SymbolExtractor>,
        classifier: Box<dyn Classifier>,
        config: ChunkerConfig,
    ) -> Self {
        Self {
            extractor,
            classifier,
            config,
        }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk one file given its relative path and content.
    pub fn chunk(&mut self, file_path: &str, source: &str) -> Result<ChunkOutcome, ChunkerError> {
        let declarations = self.extractor.extract(file_path, source)?;
        let bucket = bucket_for(file_path, &self.config.features_root);

        let mut outcome = ChunkOutcome::default();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for decl in declarations {
            if decl.content.trim().chars().count() < self.config.min_content_chars {
                debug!("Skipping trivial chunk {} in {}", decl.name, file_path);
                outcome.skipped += 1;
                continue;
            }

            let Classification { kind, role } = self.classifier.classify(&decl, file_path);

            // Repeated names of the same kind get an occurrence suffix so ids stay unique.
            let base = chunk_id(file_path, &decl.name, kind);
            let occurrence = seen.entry(base.clone()).or_insert(0);
            *occurrence += 1;
            let id = if *occurrence == 1 {
                base
            } else {
                format!("{}#{}", base, occurrence)
            };

            outcome.chunks.push(Chunk {
                id,
                file_path: file_path.to_string(),
                kind,
                name: decl.name,
                start_line: decl.start_line,
                end_line: decl.end_line.max(decl.start_line),
                content: decl.content,
                role,
                bucket: bucket.clone(),
            });
        }

        Ok(outcome)
    }
}
