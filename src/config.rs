use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::chunk::ChunkParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub store: StoreConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Corpus-file routing: data file name to target collection.
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionsConfig {
    #[serde(default = "default_dev_collection")]
    pub dev: String,
    #[serde(default = "default_qa_collection")]
    pub qa: String,
    #[serde(default = "default_prod_collection")]
    pub prod: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            dev: default_dev_collection(),
            qa: default_qa_collection(),
            prod: default_prod_collection(),
        }
    }
}

fn default_dev_collection() -> String {
    "rag_chunks_dev".to_string()
}
fn default_qa_collection() -> String {
    "rag_chunks_qa".to_string()
}
fn default_prod_collection() -> String {
    "rag_chunks_prod".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_tokens")]
    pub chunk_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_tokens: default_chunk_tokens(),
            overlap_tokens: default_overlap_tokens(),
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        ChunkParams {
            chunk_tokens: self.chunk_tokens,
            overlap_tokens: self.overlap_tokens,
            chunk_chars: self.chunk_chars,
            overlap_chars: self.overlap_chars,
        }
    }
}

fn default_chunk_tokens() -> usize {
    1000
}
fn default_overlap_tokens() -> usize {
    150
}
fn default_chunk_chars() -> usize {
    5000
}
fn default_overlap_chars() -> usize {
    800
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Override the embeddings endpoint (useful for proxies and tests).
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_timeout_secs(),
            endpoint: None,
        }
    }
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            state_file: default_state_file(),
        }
    }
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}
fn default_state_file() -> PathBuf {
    PathBuf::from("state.json")
}

impl Settings {
    /// Collection backing the named environment.
    pub fn collection_for(&self, env: &str) -> Result<&str> {
        match env {
            "dev" => Ok(self.collections.dev.as_str()),
            "qa" => Ok(self.collections.qa.as_str()),
            "prod" => Ok(self.collections.prod.as_str()),
            other => anyhow::bail!("Unknown environment: '{}'. Must be dev, qa, or prod.", other),
        }
    }

    /// Every collection this config can write to: the three environment
    /// collections plus any route targets, deduplicated.
    pub fn all_collections(&self) -> Vec<String> {
        let mut out = vec![
            self.collections.dev.clone(),
            self.collections.qa.clone(),
            self.collections.prod.clone(),
        ];
        for target in self.routes.values() {
            if !out.contains(target) {
                out.push(target.clone());
            }
        }
        out
    }
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut settings: Settings =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    apply_env_overrides(&mut settings);
    validate(&settings)?;

    Ok(settings)
}

/// Environment variables take precedence over the config file.
fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(path) = std::env::var("SILO_DB_PATH") {
        settings.store.path = PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("SILO_STATE_FILE") {
        settings.ingest.state_file = PathBuf::from(path);
    }
    if let Ok(model) = std::env::var("SILO_EMBED_MODEL") {
        settings.embedding.model = model;
    }
    override_usize("SILO_CHUNK_TOKENS", &mut settings.chunking.chunk_tokens);
    override_usize("SILO_OVERLAP_TOKENS", &mut settings.chunking.overlap_tokens);
    override_usize("SILO_CHUNK_CHARS", &mut settings.chunking.chunk_chars);
    override_usize("SILO_OVERLAP_CHARS", &mut settings.chunking.overlap_chars);
    override_usize("SILO_BATCH_SIZE", &mut settings.embedding.batch_size);
}

fn override_usize(var: &str, slot: &mut usize) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(%var, %raw, "Ignoring unparsable numeric override"),
        }
    }
}

fn validate(settings: &Settings) -> Result<()> {
    // Chunking
    if settings.chunking.chunk_tokens == 0 {
        anyhow::bail!("chunking.chunk_tokens must be > 0");
    }
    if settings.chunking.chunk_chars == 0 {
        anyhow::bail!("chunking.chunk_chars must be > 0");
    }

    // Embedding
    if settings.embedding.model.trim().is_empty() {
        anyhow::bail!("embedding.model must not be empty");
    }
    if settings.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if !(1..=10).contains(&settings.embedding.max_retries) {
        anyhow::bail!("embedding.max_retries must be between 1 and 10");
    }

    // Collections back SQL identifiers, so reject anything unquotable.
    for name in settings.all_collections() {
        if !crate::store::is_valid_collection(&name) {
            anyhow::bail!(
                "Invalid collection name: '{}'. Use letters, digits, and underscores only.",
                name
            );
        }
    }

    Ok(())
}
