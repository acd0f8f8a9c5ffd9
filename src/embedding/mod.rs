//! Embedding generation
//!
//! The retrieval core only sees the [`EmbeddingProvider`] trait. The default
//! implementation runs fastembed locally (all-MiniLM-L6-v2, 384 dimensions);
//! [`HashEmbedder`] is a deterministic no-model fallback for tests and
//! offline smoke runs.

mod provider;

pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider, HashEmbedder};

use crate::config::EmbeddingConfig;
use std::sync::Arc;

/// Build the embedding provider named by the configuration.
///
/// `model = "hashing"` selects the deterministic [`HashEmbedder`]; any other
/// value is passed to fastembed.
pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    if config.model == "hashing" {
        Ok(Arc::new(HashEmbedder::new(config.dimension)))
    } else {
        Ok(Arc::new(FastEmbedProvider::new(
            &config.model,
            config.batch_size,
        )?))
    }
}
