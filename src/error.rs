use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::index::IndexError;
use crate::llm::LlmError;
use crate::retrieval::RetrievalError;
use crate::splitter::SplitError;

/// Main error type for the docchat application
#[derive(Error, Debug)]
pub enum DocChatError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Session not found
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    /// Document splitting errors
    #[error(transparent)]
    Split(#[from] SplitError),

    /// Embedding provider errors
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Vector index errors
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Retrieval and orchestration errors
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// Language model provider errors
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for docchat operations
pub type Result<T> = std::result::Result<T, DocChatError>;
