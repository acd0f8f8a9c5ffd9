//! Retrieval: MMR re-ranking and conversational orchestration
//!
//! [`mmr_select`] turns an ANN candidate pool into a relevance-and-diversity
//! ordered selection; [`ConversationalRetriever`] drives the full
//! reformulate, retrieve, answer pipeline over one session's index.

mod mmr;
mod orchestrator;
mod prompts;

pub use mmr::{mmr_select, MmrParams};
pub use orchestrator::{ContextLimits, ConversationalRetriever};

use thiserror::Error;

use crate::index::IndexError;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("retriever not initialized: call load_retriever before invoke")]
    NotInitialized,

    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    /// A provider call failed during reformulation or synthesis. Safe to
    /// retry at the caller's discretion: invoke mutates no session state.
    #[error("generation failed during {stage}: {source}")]
    Generation {
        stage: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Index(#[from] IndexError),
}
