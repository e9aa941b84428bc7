//! TOML configuration.
//!
//! Every section is optional; missing fields fall back to the defaults
//! below. See `config/wikirag.example.toml` for a complete file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use wikirag_core::chunk::{DEFAULT_CONTEXT_LENGTH, DEFAULT_MAX_LENGTH};

use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/clean")
}
fn default_include_globs() -> Vec<String> {
    vec!["*.json".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_path")]
    pub path: PathBuf,
    /// Keep whole original documents in the archive (`id2raw`).
    #[serde(default = "default_true")]
    pub store_raw: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            path: default_archive_path(),
            store_raw: true,
        }
    }
}

fn default_archive_path() -> PathBuf {
    PathBuf::from("./db/wiki_allinone.zip")
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_context_length")]
    pub context_length: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            context_length: DEFAULT_CONTEXT_LENGTH,
        }
    }
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}
fn default_context_length() -> usize {
    DEFAULT_CONTEXT_LENGTH
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Inline key. Prefer `api_key_env` so keys stay out of config files.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.siliconflow.cn/v1/embeddings".to_string()
}
fn default_model() -> String {
    "BAAI/bge-m3".to_string()
}
fn default_api_key_env() -> String {
    "EMBEDDING_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_concurrency() -> usize {
    32
}
fn default_batch_size() -> usize {
    1
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    1000
}

impl EmbeddingConfig {
    /// Resolve the bearer token: inline `api_key` first, then the
    /// environment variable named by `api_key_env`.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        std::env::var(&self.api_key_env).with_context(|| {
            format!(
                "no embedding.api_key in config and {} is not set",
                self.api_key_env
            )
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_ms))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_context_chars() -> usize {
    60_000
}

impl Config {
    /// All-defaults configuration for commands that can run without a file.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_length == 0 {
        bail!("chunking.max_length must be > 0");
    }
    if config.source.include_globs.is_empty() {
        bail!("source.include_globs must not be empty");
    }
    if config.embedding.api_url.trim().is_empty() {
        bail!("embedding.api_url must not be empty");
    }
    if config.embedding.model.trim().is_empty() {
        bail!("embedding.model must not be empty");
    }
    if config.embedding.concurrency == 0 {
        bail!("embedding.concurrency must be >= 1");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }
    if config.embedding.max_attempts == 0 {
        bail!("embedding.max_attempts must be >= 1");
    }
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.max_length, 5000);
        assert_eq!(config.chunking.context_length, 50);
        assert_eq!(config.embedding.concurrency, 32);
        assert_eq!(config.embedding.max_attempts, 3);
        assert_eq!(config.embedding.backoff_ms, 1000);
        assert_eq!(config.embedding.timeout_secs, 60);
        assert_eq!(config.embedding.model, "BAAI/bge-m3");
        assert_eq!(config.source.include_globs, vec!["*.json"]);
        assert!(config.archive.store_raw);
        assert_eq!(config.retrieval.top_k, 5);
    }

    #[test]
    fn test_overrides() {
        let config = parse_config(
            r#"
[source]
data_dir = "/srv/wiki/clean"

[archive]
path = "/srv/wiki/kb.zip"
store_raw = false

[chunking]
max_length = 800
context_length = 20

[embedding]
api_url = "http://127.0.0.1:9000/v1/embeddings"
model = "text-embedding-3-small"
api_key = "sk-test"
concurrency = 4
backoff_ms = 10
"#,
        )
        .unwrap();
        assert_eq!(config.source.data_dir, PathBuf::from("/srv/wiki/clean"));
        assert!(!config.archive.store_raw);
        assert_eq!(config.chunking.max_length, 800);
        assert_eq!(config.embedding.concurrency, 4);
        assert_eq!(config.embedding.resolve_api_key().unwrap(), "sk-test");

        let policy = config.embedding.retry_policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff(), Duration::from_millis(10));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(parse_config("[chunking]\nmax_length = 0").is_err());
        assert!(parse_config("[embedding]\nconcurrency = 0").is_err());
        assert!(parse_config("[embedding]\nmax_attempts = 0").is_err());
        assert!(parse_config("[source]\ninclude_globs = []").is_err());
        assert!(parse_config("[retrieval]\ntop_k = 0").is_err());
        assert!(parse_config("not = [valid").is_err());
    }

    #[test]
    fn test_api_key_from_env() {
        let config = parse_config(
            "[embedding]\napi_key_env = \"WIKIRAG_TEST_KEY_FROM_ENV\"",
        )
        .unwrap();
        assert!(config.embedding.resolve_api_key().is_err());
        std::env::set_var("WIKIRAG_TEST_KEY_FROM_ENV", "sk-env");
        assert_eq!(config.embedding.resolve_api_key().unwrap(), "sk-env");
    }
}
