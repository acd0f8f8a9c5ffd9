//! Configuration management
//!
//! Loads TOML configuration with per-section defaults; missing sections and
//! keys fall back to defaults so a partial config file is valid. Validation
//! collects every violation before failing.

use crate::error::{DocChatError, Result};
use crate::index::HnswParams;
use crate::retrieval::{ContextLimits, MmrParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub splitter: SplitterConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docchat");
        Self { data_dir }
    }
}

impl StorageConfig {
    /// Root directory holding one index directory per session
    pub fn index_root(&self) -> PathBuf {
        self.data_dir.join("index")
    }
}

/// Document splitter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model name, or "hashing" for the deterministic no-model embedder
    pub model: String,
    /// Embedding dimension (must match the model)
    pub dimension: usize,
    /// Batch size for embedding generation
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            batch_size: 32,
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 100,
        }
    }
}

impl IndexConfig {
    pub fn hnsw_params(&self) -> HnswParams {
        HnswParams {
            m: self.hnsw_m,
            ef_construction: self.hnsw_ef_construction,
            ef_search: self.hnsw_ef_search,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks selected per query
    pub k: usize,
    /// Candidate pool size fetched before MMR re-ranking
    pub fetch_k: usize,
    /// MMR relevance/diversity trade-off in [0, 1]
    pub lambda_mult: f32,
    /// Maximum characters of chunk text in the answer prompt
    pub max_context_chars: usize,
    /// Number of recent history messages passed to the model
    pub history_window: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 5,
            fetch_k: 20,
            lambda_mult: 0.5,
            max_context_chars: 8000,
            history_window: 8,
        }
    }
}

impl RetrievalConfig {
    pub fn mmr_params(&self) -> MmrParams {
        MmrParams {
            k: self.k,
            fetch_k: self.fetch_k,
            lambda_mult: self.lambda_mult,
        }
    }

    pub fn context_limits(&self) -> ContextLimits {
        ContextLimits {
            max_context_chars: self.max_context_chars,
            history_window: self.history_window,
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "groq" or "echo"
    pub provider: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.1,
        }
    }
}

impl Config {
    /// Load configuration from an explicit path.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DocChatError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| DocChatError::Io {
            source: e,
            context: format!("Failed to read config file: {}", path.display()),
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from the given path, or from the default location when it
    /// exists, or fall back to defaults.
    pub fn load_or_default(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load(&path),
            None => {
                let default_path = Self::default_config_path();
                if default_path.exists() {
                    Self::load(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Default config file location (`~/.config/docchat/config.toml`)
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docchat")
            .join("config.toml")
    }
}
