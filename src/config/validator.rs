use crate::config::Config;
use crate::error::{DocChatError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every violation.
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_splitter(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_llm(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DocChatError::ConfigValidation { errors })
        }
    }

    fn validate_splitter(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.splitter.chunk_size == 0 {
            errors.push(ValidationError::new(
                "splitter.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }
        if config.splitter.chunk_overlap == 0 {
            errors.push(ValidationError::new(
                "splitter.chunk_overlap",
                "Chunk overlap must be greater than 0",
            ));
        }
        if config.splitter.chunk_overlap >= config.splitter.chunk_size {
            errors.push(ValidationError::new(
                "splitter.chunk_overlap",
                format!(
                    "Chunk overlap ({}) must be smaller than chunk size ({})",
                    config.splitter.chunk_overlap, config.splitter.chunk_size
                ),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Embedding dimension must be greater than 0",
            ));
        }
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.index.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_m",
                "HNSW m must be greater than 0",
            ));
        }
        if config.index.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }
        if config.index.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.k == 0 {
            errors.push(ValidationError::new(
                "retrieval.k",
                "k must be greater than 0",
            ));
        }
        if config.retrieval.fetch_k < config.retrieval.k {
            errors.push(ValidationError::new(
                "retrieval.fetch_k",
                format!(
                    "fetch_k ({}) must be at least k ({})",
                    config.retrieval.fetch_k, config.retrieval.k
                ),
            ));
        }
        if !(0.0..=1.0).contains(&config.retrieval.lambda_mult) {
            errors.push(ValidationError::new(
                "retrieval.lambda_mult",
                format!(
                    "lambda_mult must be between 0.0 and 1.0, got {}",
                    config.retrieval.lambda_mult
                ),
            ));
        }
        if config.retrieval.max_context_chars == 0 {
            errors.push(ValidationError::new(
                "retrieval.max_context_chars",
                "Context budget must be greater than 0",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let valid_providers = ["groq", "echo"];
        if !valid_providers.contains(&config.llm.provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, config.llm.provider
                ),
            ));
        }

        if config.llm.provider == "groq" && config.llm.api_key_env.is_empty() {
            errors.push(ValidationError::new(
                "llm.api_key_env",
                "API key environment variable name cannot be empty",
            ));
        }

        if !(0.0..=2.0).contains(&config.llm.temperature) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!(
                    "Temperature must be between 0.0 and 2.0, got {}",
                    config.llm.temperature
                ),
            ));
        }
    }
}
