//! Layered configuration for Discovery.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. `discovery.toml` (or the file passed with `--config`)
//! 3. `DISCOVERY__SECTION__KEY` environment variables
//! 4. `OLLAMA_URL` and `QDRANT_URL`

use std::path::{Path, PathBuf};

use config::{Config as ConfigLib, Environment, File, Map};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "discovery.toml";

/// Prefix of structured environment overrides.
pub const ENV_PREFIX: &str = "DISCOVERY";

pub const OLLAMA_URL_ENV: &str = "OLLAMA_URL";
pub const QDRANT_URL_ENV: &str = "QDRANT_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {field} {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Which files make up the source tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub root: String,
    pub include: Vec<String>,
    pub ignore: Vec<String>,
    /// Directory whose children name chunk buckets
    pub features_root: String,
    /// Chunk non-exported declarations too
    pub include_private: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            include: vec![
                "src/**/*.ts".to_string(),
                "src/**/*.tsx".to_string(),
                "src/**/*.js".to_string(),
                "src/**/*.jsx".to_string(),
            ],
            ignore: vec![
                "**/node_modules/**".to_string(),
                "**/*.d.ts".to_string(),
                "**/*.test.ts".to_string(),
                "**/*.test.tsx".to_string(),
                "**/*.spec.ts".to_string(),
                "**/*.spec.tsx".to_string(),
            ],
            features_root: "src".to_string(),
            include_private: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Qdrant gRPC endpoint
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection: "code_chunks".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Points per vector store upsert
    pub batch_size: usize,
    pub min_chunk_chars: usize,
    /// Changes listed before "...and N more"
    pub display_limit: usize,
    /// Write the per-bucket chunk inventory after indexing
    pub write_inventory: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            min_chunk_chars: 20,
            display_limit: 10,
            write_inventory: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub rrf_k: f64,
    pub default_limit: usize,
    pub snippet_start: String,
    pub snippet_end: String,
    pub snippet_tokens: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            default_limit: 20,
            snippet_start: "<<".to_string(),
            snippet_end: ">>".to_string(),
            snippet_tokens: 16,
        }
    }
}

/// Complete Discovery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub source: SourceConfig,
    /// Relative paths are resolved against the source root
    pub state_dir: String,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub indexing: IndexingConfig,
    pub search: SearchSettings,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            state_dir: ".discovery/state".to_string(),
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            indexing: IndexingConfig::default(),
            search: SearchSettings::default(),
        }
    }
}

impl DiscoveryConfig {
    /// Load from the process environment.
    ///
    /// An explicit `path` must exist; otherwise `discovery.toml` is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env: Map<String, String> = std::env::vars().collect();
        Self::load_with_env(path, env)
    }

    /// Load with an explicit set of environment variables.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Map<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder();

        match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                builder = builder.add_source(File::from(path));
            }
            None => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        );

        if let Some(url) = non_empty(&env, OLLAMA_URL_ENV) {
            builder = builder.set_override("embedding.base_url", url)?;
        }
        if let Some(url) = non_empty(&env, QDRANT_URL_ENV) {
            builder = builder.set_override("vector_store.url", url)?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::invalid("embedding.dimensions", "must be greater than 0"));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::invalid("embedding.model", "must not be empty"));
        }
        if self.indexing.batch_size == 0 {
            return Err(ConfigError::invalid("indexing.batch_size", "must be greater than 0"));
        }
        if self.source.include.is_empty() {
            return Err(ConfigError::invalid("source.include", "must list at least one glob"));
        }
        check_url("embedding.base_url", &self.embedding.base_url)?;
        check_url("vector_store.url", &self.vector_store.url)?;
        if !(1..=64).contains(&self.search.snippet_tokens) {
            return Err(ConfigError::invalid("search.snippet_tokens", "must be between 1 and 64"));
        }
        if !self.search.rrf_k.is_finite() || self.search.rrf_k <= 0.0 {
            return Err(ConfigError::invalid("search.rrf_k", "must be a positive number"));
        }
        Ok(())
    }

    /// Source root with `~` expanded.
    pub fn root_path(&self) -> PathBuf {
        expand(&self.source.root)
    }

    /// State directory, resolved against the source root when relative.
    pub fn state_path(&self) -> PathBuf {
        let state = expand(&self.state_dir);
        if state.is_absolute() {
            state
        } else {
            self.root_path().join(state)
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.state_path().join("source-manifest.json")
    }

    /// Digests of the files the search indexes were last built from.
    pub fn indexed_manifest_path(&self) -> PathBuf {
        self.state_path().join("indexed-manifest.json")
    }

    pub fn lexical_path(&self) -> PathBuf {
        self.state_path().join("lexical.db")
    }

    pub fn inventory_dir(&self) -> PathBuf {
        self.state_path().join("chunk-inventory")
    }
}

fn non_empty(env: &Map<String, String>, key: &str) -> Option<String> {
    env.get(key).filter(|v| !v.trim().is_empty()).cloned()
}

fn check_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be an http(s) URL, got '{}'", url)))
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("discovery.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.state_dir, ".discovery/state");
        assert_eq!(config.embedding.model, "nomic-embed-text");
        assert_eq!(config.embedding.dimensions, 768);
        assert_eq!(config.embedding.timeout_secs, 30);
        assert_eq!(config.vector_store.collection, "code_chunks");
        assert_eq!(config.vector_store.timeout_secs, 10);
        assert_eq!(config.indexing.batch_size, 50);
        assert_eq!(config.indexing.min_chunk_chars, 20);
        assert_eq!(config.indexing.display_limit, 10);
        assert_eq!(config.search.rrf_k, 60.0);
        assert_eq!(config.search.default_limit, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
state_dir = "/var/lib/discovery"

[embedding]
model = "mxbai-embed-large"
dimensions = 1024

[indexing]
batch_size = 10
"#,
        );

        let config = DiscoveryConfig::load_with_env(Some(&path), Map::new()).unwrap();
        assert_eq!(config.embedding.model, "mxbai-embed-large");
        assert_eq!(config.embedding.dimensions, 1024);
        assert_eq!(config.embedding.base_url, "http://localhost:11434");
        assert_eq!(config.indexing.batch_size, 10);
        assert_eq!(config.indexing.display_limit, 10);
        assert_eq!(config.search, SearchSettings::default());
        assert_eq!(config.state_path(), PathBuf::from("/var/lib/discovery"));
    }

    #[test]
    fn test_prefixed_env_overrides_file() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path(), "[indexing]\nbatch_size = 10\n");

        let config = DiscoveryConfig::load_with_env(
            Some(&path),
            env(&[
                ("DISCOVERY__INDEXING__BATCH_SIZE", "25"),
                ("DISCOVERY__VECTOR_STORE__COLLECTION", "crm_chunks"),
            ]),
        )
        .unwrap();
        assert_eq!(config.indexing.batch_size, 25);
        assert_eq!(config.vector_store.collection, "crm_chunks");
    }

    #[test]
    fn test_service_url_variables() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path(), "[embedding]\nbase_url = \"http://file:11434\"\n");

        let config = DiscoveryConfig::load_with_env(
            Some(&path),
            env(&[
                ("OLLAMA_URL", "http://gpu-box:11434"),
                ("QDRANT_URL", "http://qdrant:6334"),
            ]),
        )
        .unwrap();
        assert_eq!(config.embedding.base_url, "http://gpu-box:11434");
        assert_eq!(config.vector_store.url, "http://qdrant:6334");

        let config =
            DiscoveryConfig::load_with_env(Some(&path), env(&[("OLLAMA_URL", "  ")])).unwrap();
        assert_eq!(config.embedding.base_url, "http://file:11434");
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempdir().unwrap();
        let err = DiscoveryConfig::load_with_env(Some(&dir.path().join("nope.toml")), Map::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_validation_rules() {
        let mut config = DiscoveryConfig::default();
        config.embedding.dimensions = 0;
        assert!(config.validate().unwrap_err().to_string().contains("embedding.dimensions"));

        let mut config = DiscoveryConfig::default();
        config.indexing.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = DiscoveryConfig::default();
        config.embedding.model = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = DiscoveryConfig::default();
        config.source.include.clear();
        assert!(config.validate().is_err());

        let mut config = DiscoveryConfig::default();
        config.vector_store.url = "localhost:6334".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http(s)"));
    }

    #[test]
    fn test_rrf_k_must_be_positive() {
        for bad in [0.0, -60.0, f64::NAN, f64::INFINITY] {
            let mut config = DiscoveryConfig::default();
            config.search.rrf_k = bad;
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("search.rrf_k"), "accepted {}", bad);
        }

        let mut config = DiscoveryConfig::default();
        config.search.rrf_k = 0.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rrf_k_from_file_is_validated() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path(), "[search]\nrrf_k = 0\n");
        let err = DiscoveryConfig::load_with_env(Some(&path), Map::new()).unwrap_err();
        assert!(err.to_string().contains("search.rrf_k"));
    }

    #[test]
    fn test_invalid_file_values_are_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path(), "[embedding]\ndimensions = 0\n");
        let err = DiscoveryConfig::load_with_env(Some(&path), Map::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_state_paths_relative_to_root() {
        let mut config = DiscoveryConfig::default();
        config.source.root = "/work/crm".to_string();

        assert_eq!(config.state_path(), PathBuf::from("/work/crm/.discovery/state"));
        assert_eq!(
            config.manifest_path(),
            PathBuf::from("/work/crm/.discovery/state/source-manifest.json")
        );
        assert_eq!(
            config.indexed_manifest_path(),
            PathBuf::from("/work/crm/.discovery/state/indexed-manifest.json")
        );
        assert_eq!(config.lexical_path(), PathBuf::from("/work/crm/.discovery/state/lexical.db"));
        assert_eq!(
            config.inventory_dir(),
            PathBuf::from("/work/crm/.discovery/state/chunk-inventory")
        );
    }

    #[test]
    fn test_tilde_expansion() {
        let mut config = DiscoveryConfig::default();
        config.source.root = "~/projects/crm".to_string();
        assert!(!config.root_path().to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_serializes_to_json() {
        let value = serde_json::to_value(DiscoveryConfig::default()).unwrap();
        assert_eq!(value["vector_store"]["collection"], "code_chunks");
        assert_eq!(value["search"]["snippet_start"], "<<");
    }
}
