//! Document ingestion into a session index
//!
//! Ties the splitter and the vector index manager together: split the loaded
//! documents, open or create the session's index, add the new chunks, and
//! report what happened. Loading files into `LoadedDocument`s is the
//! caller's job; the ingestor never looks at file types.

use std::sync::Arc;

use crate::error::Result;
use crate::index::VectorIndexManager;
use crate::splitter::{split_documents, LoadedDocument};

/// Outcome of one ingestion call
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub session_id: String,
    /// Chunks produced by the splitter
    pub chunks: usize,
    /// Chunks newly added to the index (the rest were duplicates)
    pub added: usize,
}

/// Ingestion façade over the splitter and index manager
pub struct Ingestor {
    manager: Arc<VectorIndexManager>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Ingestor {
    pub fn new(manager: Arc<VectorIndexManager>, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            manager,
            chunk_size,
            chunk_overlap,
        }
    }

    /// Split documents and add their chunks to the session's index,
    /// creating the index on first ingest. Persisted before returning.
    pub fn ingest(&self, session_id: &str, docs: &[LoadedDocument]) -> Result<IngestReport> {
        let chunks = split_documents(docs, self.chunk_size, self.chunk_overlap)?;

        let mut index = self.manager.create_or_open(session_id)?;
        let added = self.manager.add_documents(&mut index, &chunks)?;

        tracing::info!(
            session_id,
            documents = docs.len(),
            chunks = chunks.len(),
            added,
            "ingestion complete"
        );

        Ok(IngestReport {
            session_id: session_id.to_string(),
            chunks: chunks.len(),
            added,
        })
    }
}
