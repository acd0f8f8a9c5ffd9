//! Session-scoped persistent vector index
//!
//! Each session owns one index directory holding two sibling files:
//! `vectors.bin` (entry count, dimension, then packed f32 LE vectors) and
//! `chunks.json` (the chunk payloads, index-aligned with the vectors).
//! Durability comes from those files; the HNSW graph used for approximate
//! nearest-neighbor queries is rebuilt from them on load and never
//! serialized. Both files are written atomically (temp file, sync, rename),
//! and `add_documents` persists before returning, so a fresh `load` in
//! another process always sees completed ingestions.
//!
//! Ingestion is idempotent: chunks whose fingerprint is already present are
//! skipped without re-embedding.
//!
//! Concurrency contract: at most one writer per session id. Callers must
//! serialize `add_documents`/`persist` on the same session and keep reads
//! from overlapping an in-progress write; different sessions are fully
//! independent.

use ahash::AHashSet;
use hnsw_rs::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::splitter::Chunk;

const VECTORS_FILE: &str = "vectors.bin";
const CHUNKS_FILE: &str = "chunks.json";
const VECTORS_HEADER_LEN: usize = 8;

const MIN_HNSW_CAPACITY: usize = 1024;
const HNSW_MAX_LAYER: usize = 16;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index not found for session {session_id}: {path}")]
    NotFound { session_id: String, path: PathBuf },

    #[error("index corrupt at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },
}

fn io_err(source: std::io::Error, context: impl Into<String>) -> IndexError {
    IndexError::Io {
        source,
        context: context.into(),
    }
}

/// HNSW construction and search parameters
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 100,
        }
    }
}

/// Query-time candidate: a stored chunk plus its similarity to the query
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    /// Cosine similarity to the query, higher is more similar
    pub score: f32,
}

struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// One session's vector index: fingerprint-deduplicated entries plus an
/// in-memory HNSW graph over their vectors
pub struct SessionIndex {
    session_id: String,
    path: PathBuf,
    dimension: usize,
    entries: Vec<IndexEntry>,
    fingerprints: AHashSet<String>,
    hnsw: Hnsw<'static, f32, DistCosine>,
    capacity: usize,
    hnsw_params: HnswParams,
}

impl SessionIndex {
    fn empty(session_id: &str, path: PathBuf, dimension: usize, params: HnswParams) -> Self {
        let capacity = MIN_HNSW_CAPACITY;
        Self {
            session_id: session_id.to_string(),
            path,
            dimension,
            entries: Vec::new(),
            fingerprints: AHashSet::new(),
            hnsw: build_hnsw(params, capacity),
            capacity,
            hnsw_params: params,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_fingerprint(&self, fingerprint: &str) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    fn insert(&mut self, chunk: &Chunk, vector: Vec<f32>) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        if self.entries.len() >= self.capacity {
            self.grow();
        }

        let id = self.entries.len();
        self.hnsw.insert((&vector, id));
        self.fingerprints.insert(chunk.fingerprint.clone());
        self.entries.push(IndexEntry {
            chunk: chunk.clone(),
            vector,
        });
        Ok(())
    }

    /// Double the HNSW capacity and re-insert every stored vector.
    fn grow(&mut self) {
        self.capacity *= 2;
        self.hnsw = build_hnsw(self.hnsw_params, self.capacity);
        for (id, entry) in self.entries.iter().enumerate() {
            self.hnsw.insert((&entry.vector, id));
        }
        tracing::debug!(
            session_id = %self.session_id,
            capacity = self.capacity,
            "vector index rebuilt at larger capacity"
        );
    }

    /// Approximate nearest-neighbor search: up to `fetch_k` candidates by
    /// descending cosine similarity to the query.
    pub fn search(
        &self,
        query: &[f32],
        fetch_k: usize,
        ef_search: usize,
    ) -> Result<Vec<Candidate>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if self.entries.is_empty() || fetch_k == 0 {
            return Ok(Vec::new());
        }

        let k = fetch_k.min(self.entries.len());
        let neighbours = self.hnsw.search(query, k, ef_search.max(k));

        let mut candidates: Vec<Candidate> = neighbours
            .into_iter()
            .map(|n| {
                let entry = &self.entries[n.d_id];
                Candidate {
                    chunk: entry.chunk.clone(),
                    vector: entry.vector.clone(),
                    score: 1.0 - n.distance,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(candidates)
    }

    fn persist(&self) -> Result<(), IndexError> {
        fs::create_dir_all(&self.path).map_err(|e| {
            io_err(
                e,
                format!("failed to create index directory: {}", self.path.display()),
            )
        })?;

        let mut vector_bytes =
            Vec::with_capacity(VECTORS_HEADER_LEN + self.entries.len() * self.dimension * 4);
        vector_bytes.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        vector_bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        for entry in &self.entries {
            for value in &entry.vector {
                vector_bytes.extend_from_slice(&value.to_le_bytes());
            }
        }

        let chunks: Vec<&Chunk> = self.entries.iter().map(|e| &e.chunk).collect();
        let chunk_bytes = serde_json::to_vec(&chunks).map_err(|e| IndexError::Json {
            source: e,
            context: "failed to serialize chunk payloads".to_string(),
        })?;

        atomic_write(&self.path.join(VECTORS_FILE), &vector_bytes)?;
        atomic_write(&self.path.join(CHUNKS_FILE), &chunk_bytes)?;
        Ok(())
    }
}

fn build_hnsw(params: HnswParams, capacity: usize) -> Hnsw<'static, f32, DistCosine> {
    Hnsw::new(
        params.m,
        capacity,
        HNSW_MAX_LAYER,
        params.ef_construction,
        DistCosine,
    )
}

/// Write to a temp sibling, sync, then rename into place.
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let temp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&temp_path).map_err(|e| {
        io_err(
            e,
            format!("failed to create temp file: {}", temp_path.display()),
        )
    })?;
    file.write_all(bytes)
        .map_err(|e| io_err(e, format!("failed to write: {}", temp_path.display())))?;
    file.sync_all()
        .map_err(|e| io_err(e, format!("failed to sync: {}", temp_path.display())))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| {
        io_err(
            e,
            format!(
                "failed to rename {} -> {}",
                temp_path.display(),
                path.display()
            ),
        )
    })?;
    Ok(())
}

/// Manager for per-session vector indexes under one storage root
pub struct VectorIndexManager {
    index_root: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    hnsw_params: HnswParams,
}

impl VectorIndexManager {
    pub fn new(
        index_root: PathBuf,
        embedder: Arc<dyn EmbeddingProvider>,
        hnsw_params: HnswParams,
    ) -> Self {
        Self {
            index_root,
            embedder,
            hnsw_params,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Storage directory for a session's index
    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.index_root.join(session_id)
    }

    /// Whether a persisted index exists for the session
    pub fn exists(&self, session_id: &str) -> bool {
        self.session_path(session_id).join(VECTORS_FILE).exists()
    }

    /// List session ids with a persisted index, sorted ascending
    pub fn list_sessions(&self) -> Result<Vec<String>, IndexError> {
        list_sessions(&self.index_root)
    }

    /// Load the session's persisted index, or initialize an empty one when
    /// nothing has been persisted yet.
    pub fn create_or_open(&self, session_id: &str) -> Result<SessionIndex, IndexError> {
        let path = self.session_path(session_id);
        let has_vectors = path.join(VECTORS_FILE).exists();
        let has_chunks = path.join(CHUNKS_FILE).exists();

        match (has_vectors, has_chunks) {
            (true, true) => self.load(session_id),
            (false, false) => Ok(SessionIndex::empty(
                session_id,
                path,
                self.embedder.dimension(),
                self.hnsw_params,
            )),
            _ => Err(IndexError::Corrupt {
                path,
                reason: "incomplete index: one of vectors.bin/chunks.json is missing".to_string(),
            }),
        }
    }

    /// Load a persisted session index from disk.
    ///
    /// Fails with [`IndexError::NotFound`] when nothing was ever persisted
    /// for the session, and [`IndexError::Corrupt`] when the on-disk files
    /// are incomplete or inconsistent.
    pub fn load(&self, session_id: &str) -> Result<SessionIndex, IndexError> {
        let path = self.session_path(session_id);
        let vectors_path = path.join(VECTORS_FILE);
        let chunks_path = path.join(CHUNKS_FILE);

        if !vectors_path.exists() && !chunks_path.exists() {
            return Err(IndexError::NotFound {
                session_id: session_id.to_string(),
                path,
            });
        }
        if !vectors_path.exists() || !chunks_path.exists() {
            return Err(IndexError::Corrupt {
                path,
                reason: "incomplete index: one of vectors.bin/chunks.json is missing".to_string(),
            });
        }

        let (vectors, dimension) = read_vectors(&vectors_path)?;

        let chunk_bytes = fs::read(&chunks_path).map_err(|e| {
            io_err(
                e,
                format!("failed to read chunk payloads: {}", chunks_path.display()),
            )
        })?;
        let chunks: Vec<Chunk> =
            serde_json::from_slice(&chunk_bytes).map_err(|e| IndexError::Corrupt {
                path: path.clone(),
                reason: format!("unreadable chunk payloads: {}", e),
            })?;

        if chunks.len() != vectors.len() {
            return Err(IndexError::Corrupt {
                path,
                reason: format!(
                    "payload count {} does not match vector count {}",
                    chunks.len(),
                    vectors.len()
                ),
            });
        }
        if dimension != self.embedder.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: self.embedder.dimension(),
                actual: dimension,
            });
        }

        let capacity = (vectors.len().max(1)).next_power_of_two().max(MIN_HNSW_CAPACITY);
        let mut index = SessionIndex {
            session_id: session_id.to_string(),
            path,
            dimension,
            entries: Vec::with_capacity(vectors.len()),
            fingerprints: AHashSet::with_capacity(vectors.len()),
            hnsw: build_hnsw(self.hnsw_params, capacity),
            capacity,
            hnsw_params: self.hnsw_params,
        };
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            let id = index.entries.len();
            index.hnsw.insert((&vector, id));
            index.fingerprints.insert(chunk.fingerprint.clone());
            index.entries.push(IndexEntry { chunk, vector });
        }

        tracing::debug!(
            session_id = %index.session_id,
            entries = index.len(),
            "session index loaded"
        );
        Ok(index)
    }

    /// Insert chunks whose fingerprint is not yet present, embedding them in
    /// one batch, and persist the index before returning. Returns the number
    /// of newly inserted chunks; re-ingesting an identical chunk set returns
    /// 0 and leaves retrievable state unchanged.
    pub fn add_documents(
        &self,
        index: &mut SessionIndex,
        chunks: &[Chunk],
    ) -> Result<usize, IndexError> {
        let mut fresh: Vec<&Chunk> = Vec::new();
        let mut batch_seen: AHashSet<&str> = AHashSet::new();
        for chunk in chunks {
            if index.contains_fingerprint(&chunk.fingerprint)
                || !batch_seen.insert(chunk.fingerprint.as_str())
            {
                continue;
            }
            fresh.push(chunk);
        }

        if fresh.is_empty() {
            tracing::debug!(
                session_id = %index.session_id(),
                offered = chunks.len(),
                "no new chunks to index"
            );
            return Ok(0);
        }

        let added = fresh.len();
        let texts: Vec<String> = fresh.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;
        if embeddings.len() != added {
            return Err(IndexError::Embedding(EmbeddingError::Generation(format!(
                "embedding count mismatch: expected {}, got {}",
                added,
                embeddings.len()
            ))));
        }

        for (chunk, vector) in fresh.into_iter().zip(embeddings) {
            index.insert(chunk, vector)?;
        }
        self.persist(index)?;

        tracing::info!(
            session_id = %index.session_id(),
            added,
            total = index.len(),
            "session index updated"
        );
        Ok(added)
    }

    /// Write the index to its storage path.
    pub fn persist(&self, index: &SessionIndex) -> Result<(), IndexError> {
        index.persist()
    }

    /// ANN search with the manager's configured `ef_search`.
    pub fn search(
        &self,
        index: &SessionIndex,
        query: &[f32],
        fetch_k: usize,
    ) -> Result<Vec<Candidate>, IndexError> {
        index.search(query, fetch_k, self.hnsw_params.ef_search)
    }
}

/// List session ids with a persisted index under `index_root`, sorted
/// ascending.
pub fn list_sessions(index_root: &Path) -> Result<Vec<String>, IndexError> {
    if !index_root.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(index_root)
        .map_err(|e| io_err(e, format!("failed to read index root: {}", index_root.display())))?;

    let mut sessions = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(e, "failed to read index root entry".to_string()))?;
        if entry.path().join(VECTORS_FILE).exists() {
            sessions.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    sessions.sort();
    Ok(sessions)
}

fn read_vectors(path: &Path) -> Result<(Vec<Vec<f32>>, usize), IndexError> {
    let bytes = fs::read(path)
        .map_err(|e| io_err(e, format!("failed to read vectors: {}", path.display())))?;

    if bytes.len() < VECTORS_HEADER_LEN {
        return Err(IndexError::Corrupt {
            path: path.to_path_buf(),
            reason: "vectors file shorter than header".to_string(),
        });
    }

    let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let dimension = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;

    if dimension == 0 && count > 0 {
        return Err(IndexError::Corrupt {
            path: path.to_path_buf(),
            reason: "zero dimension with non-zero entry count".to_string(),
        });
    }

    let expected = VECTORS_HEADER_LEN + count * dimension * 4;
    if bytes.len() != expected {
        return Err(IndexError::Corrupt {
            path: path.to_path_buf(),
            reason: format!(
                "vector data size mismatch: expected {} bytes, found {}",
                expected,
                bytes.len()
            ),
        });
    }

    let mut vectors = Vec::with_capacity(count);
    let mut cursor = VECTORS_HEADER_LEN;
    for _ in 0..count {
        let mut vector = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            vector.push(f32::from_le_bytes([
                bytes[cursor],
                bytes[cursor + 1],
                bytes[cursor + 2],
                bytes[cursor + 3],
            ]));
            cursor += 4;
        }
        vectors.push(vector);
    }
    Ok((vectors, dimension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use tempfile::TempDir;

    fn manager(root: &Path) -> VectorIndexManager {
        VectorIndexManager::new(
            root.to_path_buf(),
            Arc::new(HashEmbedder::new(64)),
            HnswParams::default(),
        )
    }

    fn chunk(text: &str, seq: usize) -> Chunk {
        Chunk::new(text, "doc", seq, 0)
    }

    #[test]
    fn test_create_or_open_empty() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(temp.path());

        let index = mgr.create_or_open("s1").unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 64);
    }

    #[test]
    fn test_add_documents_inserts_and_counts() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(temp.path());
        let mut index = mgr.create_or_open("s1").unwrap();

        let chunks = vec![
            chunk("first chunk of text", 0),
            chunk("second chunk of text", 1),
        ];
        let added = mgr.add_documents(&mut index, &chunks).unwrap();
        assert_eq!(added, 2);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_add_documents_idempotent() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(temp.path());
        let mut index = mgr.create_or_open("s1").unwrap();

        let chunks = vec![
            chunk("alpha content here", 0),
            chunk("beta content here", 1),
            chunk("gamma content here", 2),
        ];
        assert_eq!(mgr.add_documents(&mut index, &chunks).unwrap(), 3);
        assert_eq!(mgr.add_documents(&mut index, &chunks).unwrap(), 0);
        assert_eq!(index.len(), 3);

        // Reload and confirm the second call changed nothing on disk either.
        let reloaded = mgr.load("s1").unwrap();
        assert_eq!(reloaded.len(), 3);
        for c in &chunks {
            assert!(reloaded.contains_fingerprint(&c.fingerprint));
        }
    }

    #[test]
    fn test_add_documents_dedups_within_batch() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(temp.path());
        let mut index = mgr.create_or_open("s1").unwrap();

        let chunks = vec![chunk("repeated text", 0), chunk("repeated text", 1)];
        assert_eq!(mgr.add_documents(&mut index, &chunks).unwrap(), 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_persist_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();

        {
            let mgr = manager(temp.path());
            let mut index = mgr.create_or_open("s1").unwrap();
            let chunks = vec![
                chunk("the quick brown fox", 0),
                chunk("jumps over the lazy dog", 1),
            ];
            mgr.add_documents(&mut index, &chunks).unwrap();
        }

        // Fresh manager simulates a new process.
        let mgr = manager(temp.path());
        let index = mgr.load("s1").unwrap();
        assert_eq!(index.len(), 2);

        let query = mgr.embedder().embed_query("quick brown fox").unwrap();
        let results = mgr.search(&index, &query, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].chunk.text.contains("quick brown fox"));
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_load_missing_session() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(temp.path());
        assert!(matches!(
            mgr.load("nope"),
            Err(IndexError::NotFound { .. })
        ));
    }

    #[test]
    fn test_corrupt_truncated_vectors() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(temp.path());
        let mut index = mgr.create_or_open("s1").unwrap();
        mgr.add_documents(&mut index, &[chunk("some text to store", 0)])
            .unwrap();

        let vectors_path = temp.path().join("s1").join(VECTORS_FILE);
        let bytes = fs::read(&vectors_path).unwrap();
        fs::write(&vectors_path, &bytes[..bytes.len() - 4]).unwrap();

        assert!(matches!(mgr.load("s1"), Err(IndexError::Corrupt { .. })));
    }

    #[test]
    fn test_corrupt_missing_sibling_file() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(temp.path());
        let mut index = mgr.create_or_open("s1").unwrap();
        mgr.add_documents(&mut index, &[chunk("some text to store", 0)])
            .unwrap();

        fs::remove_file(temp.path().join("s1").join(CHUNKS_FILE)).unwrap();

        assert!(matches!(mgr.load("s1"), Err(IndexError::Corrupt { .. })));
        assert!(matches!(
            mgr.create_or_open("s1"),
            Err(IndexError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_search_empty_index() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(temp.path());
        let index = mgr.create_or_open("s1").unwrap();

        let query = mgr.embedder().embed_query("anything").unwrap();
        assert!(mgr.search(&index, &query, 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_caps_at_pool_size() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(temp.path());
        let mut index = mgr.create_or_open("s1").unwrap();
        mgr.add_documents(
            &mut index,
            &[chunk("only entry in the index", 0)],
        )
        .unwrap();

        let query = mgr.embedder().embed_query("entry").unwrap();
        let results = mgr.search(&index, &query, 20).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_on_search() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(temp.path());
        let mut index = mgr.create_or_open("s1").unwrap();
        mgr.add_documents(&mut index, &[chunk("text", 0)]).unwrap();

        let result = mgr.search(&index, &[0.5; 32], 5);
        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch { expected: 64, actual: 32 })
        ));
    }

    #[test]
    fn test_list_sessions() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(temp.path());

        for session in ["s-b", "s-a"] {
            let mut index = mgr.create_or_open(session).unwrap();
            mgr.add_documents(&mut index, &[chunk("content", 0)]).unwrap();
        }

        assert_eq!(mgr.list_sessions().unwrap(), vec!["s-a", "s-b"]);
    }
}
