//! Document splitting into fixed-size overlapping chunks
//!
//! Documents arrive as plain text plus a source identifier. The splitter
//! walks each document with a window of `chunk_size` characters, cutting at
//! the last paragraph boundary inside the window, falling back to sentence
//! and word boundaries, and hard-cutting only when the window contains no
//! boundary at all. Consecutive chunks of one document share roughly
//! `chunk_overlap` characters. Chunk texts are raw substrings of the source,
//! so concatenating them reproduces overlapping coverage of the document.
//!
//! Every chunk carries a BLAKE3 fingerprint of its whitespace-normalized
//! text plus its source id; the index uses it as the deduplication key.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// A document normalized to plain text by the caller
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub text: String,
    pub source_id: String,
}

impl LoadedDocument {
    pub fn new(text: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
        }
    }
}

/// An immutable slice of a source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Raw substring of the source text
    pub text: String,
    /// Identifier of the source document
    pub source_id: String,
    /// Position of this chunk among the chunks of its source
    pub sequence: usize,
    /// Byte offset of the chunk start in the source text
    pub offset: usize,
    /// Deduplication key: BLAKE3 of normalized text + source id
    pub fingerprint: String,
}

impl Chunk {
    pub fn new(text: &str, source_id: &str, sequence: usize, offset: usize) -> Self {
        Self {
            text: text.to_string(),
            source_id: source_id.to_string(),
            sequence,
            offset,
            fingerprint: fingerprint(text, source_id),
        }
    }
}

/// Compute a chunk's deduplication fingerprint.
///
/// Leading/trailing whitespace is stripped and inner whitespace runs
/// collapse to a single space before hashing, so incidental formatting
/// differences do not defeat deduplication. The source id is mixed in to
/// keep identical boilerplate in two documents as separate entries.
pub fn fingerprint(text: &str, source_id: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let ws = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));

    let normalized = ws.replace_all(text.trim(), " ");

    let mut hasher = blake3::Hasher::new();
    hasher.update(normalized.as_bytes());
    hasher.update(b"\0");
    hasher.update(source_id.as_bytes());
    hasher.finalize().to_hex().to_string()
}

// Boundary classes in preference order. Cuts land immediately after the
// separator, so the next chunk starts on fresh content.
const PARAGRAPH_SEPARATORS: &[&str] = &["\n\n"];
const SENTENCE_SEPARATORS: &[&str] = &[". ", "! ", "? ", "\n"];
const WORD_SEPARATORS: &[&str] = &[" "];

/// Split documents into chunks of at most `chunk_size` characters with
/// roughly `chunk_overlap` characters shared between consecutive chunks.
///
/// Deterministic: the same input and parameters produce the same chunk
/// sequence, texts, offsets, and fingerprints on every run.
pub fn split_documents(
    docs: &[LoadedDocument],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>, SplitError> {
    if chunk_size == 0 || chunk_overlap == 0 {
        return Err(SplitError::Configuration(format!(
            "chunk_size and chunk_overlap must be positive, got {} and {}",
            chunk_size, chunk_overlap
        )));
    }
    if chunk_overlap >= chunk_size {
        return Err(SplitError::Configuration(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }

    let mut chunks = Vec::new();
    for doc in docs {
        let before = chunks.len();
        split_document(&mut chunks, doc, chunk_size, chunk_overlap);
        tracing::debug!(
            source_id = %doc.source_id,
            chunks = chunks.len() - before,
            "document split"
        );
    }
    Ok(chunks)
}

fn split_document(
    out: &mut Vec<Chunk>,
    doc: &LoadedDocument,
    chunk_size: usize,
    chunk_overlap: usize,
) {
    let text = doc.text.as_str();
    let char_starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let total_chars = char_starts.len();

    let byte_at = |pos: usize| {
        if pos >= total_chars {
            text.len()
        } else {
            char_starts[pos]
        }
    };

    let mut start = 0usize; // char position
    let mut sequence = 0usize;

    while start < total_chars {
        let window_end = (start + chunk_size).min(total_chars);
        let cut_byte = if window_end == total_chars {
            text.len()
        } else {
            find_cut(text, byte_at(start), byte_at(window_end)).unwrap_or_else(|| byte_at(window_end))
        };

        let piece = &text[byte_at(start)..cut_byte];
        if !piece.trim().is_empty() {
            out.push(Chunk::new(piece, &doc.source_id, sequence, byte_at(start)));
            sequence += 1;
        }

        let cut = char_position(&char_starts, text.len(), cut_byte);
        if cut >= total_chars {
            break;
        }
        start = cut.saturating_sub(chunk_overlap).max(start + 1);
    }
}

/// Find the best cut position in `(byte_start, byte_end]`: the end of the
/// last separator occurrence in the window, searching paragraph, then
/// sentence, then word separators. Returns `None` when the window contains
/// no boundary.
fn find_cut(text: &str, byte_start: usize, byte_end: usize) -> Option<usize> {
    let window = &text[byte_start..byte_end];
    for class in [PARAGRAPH_SEPARATORS, SENTENCE_SEPARATORS, WORD_SEPARATORS] {
        let mut best: Option<usize> = None;
        for sep in class {
            if let Some(pos) = window.rfind(sep) {
                let cut = byte_start + pos + sep.len();
                if cut > byte_start && cut <= byte_end {
                    best = Some(best.map_or(cut, |b| b.max(cut)));
                }
            }
        }
        if best.is_some() {
            return best;
        }
    }
    None
}

/// Map a byte offset (always a char boundary here) back to its char position.
fn char_position(char_starts: &[usize], text_len: usize, byte: usize) -> usize {
    if byte >= text_len {
        return char_starts.len();
    }
    match char_starts.binary_search(&byte) {
        Ok(pos) => pos,
        Err(pos) => pos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Vec<LoadedDocument> {
        vec![LoadedDocument::new(text, "doc1")]
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let docs = doc("some text");
        assert!(matches!(
            split_documents(&docs, 0, 1),
            Err(SplitError::Configuration(_))
        ));
        assert!(matches!(
            split_documents(&docs, 100, 0),
            Err(SplitError::Configuration(_))
        ));
        assert!(matches!(
            split_documents(&docs, 100, 100),
            Err(SplitError::Configuration(_))
        ));
        assert!(matches!(
            split_documents(&docs, 100, 150),
            Err(SplitError::Configuration(_))
        ));
    }

    #[test]
    fn test_small_document_single_chunk() {
        let chunks = split_documents(&doc("Hello, world!"), 100, 10).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].sequence, 0);
        assert_eq!(chunks[0].offset, 0);
    }

    #[test]
    fn test_empty_document_yields_no_chunks() {
        assert!(split_documents(&doc(""), 100, 10).unwrap().is_empty());
        assert!(split_documents(&doc("   \n\n  "), 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_chunk_length_bound() {
        let text = "word ".repeat(500);
        let chunks = split_documents(&doc(&text), 64, 16).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 64);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = format!("{}\n\n{}", "a".repeat(50), "b".repeat(50));
        let chunks = split_documents(&doc(&text), 80, 10).unwrap();
        // The window covers the paragraph break, so the first chunk ends there
        // instead of hard-cutting at 80 characters.
        assert_eq!(chunks[0].text, format!("{}\n\n", "a".repeat(50)));
    }

    #[test]
    fn test_prefers_sentence_over_word_boundary() {
        let text = "First sentence here. Second sentence follows with more words after it";
        let chunks = split_documents(&doc(&text), 40, 5).unwrap();
        assert!(chunks[0].text.ends_with(". "));
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let text = "x".repeat(250);
        let chunks = split_documents(&doc(&text), 100, 10).unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].text.len(), 100);
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = "word ".repeat(200);
        let chunks = split_documents(&doc(&text), 50, 10).unwrap();
        for pair in chunks.windows(2) {
            let first_end = pair[0].offset + pair[0].text.len();
            assert!(pair[1].offset < first_end, "chunks must overlap");
            let shared = first_end - pair[1].offset;
            assert!(shared <= 10, "overlap of {} exceeds configured 10", shared);
        }
    }

    #[test]
    fn test_offsets_map_into_source() {
        let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota kappa lambda mu.";
        let chunks = split_documents(&doc(text), 30, 5).unwrap();
        for chunk in &chunks {
            assert_eq!(
                &text[chunk.offset..chunk.offset + chunk.text.len()],
                chunk.text
            );
        }
    }

    #[test]
    fn test_multibyte_utf8_safety() {
        let text = "héllo wörld ünïcode ".repeat(30);
        let chunks = split_documents(&doc(&text), 40, 8).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 40);
        }
    }

    #[test]
    fn test_deterministic_output() {
        let text = "Paragraph one.\n\nParagraph two with more text.\n\nParagraph three.";
        let a = split_documents(&doc(text), 30, 5).unwrap();
        let b = split_documents(&doc(text), 30, 5).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.offset, y.offset);
            assert_eq!(x.fingerprint, y.fingerprint);
        }
    }

    #[test]
    fn test_sequence_numbers_contiguous() {
        let text = "sentence one here. ".repeat(30);
        let chunks = split_documents(&doc(&text), 60, 12).unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence, i);
        }
    }

    #[test]
    fn test_fingerprint_normalizes_whitespace() {
        assert_eq!(
            fingerprint("hello   world", "s"),
            fingerprint("hello world", "s")
        );
        assert_eq!(
            fingerprint("  hello\nworld  ", "s"),
            fingerprint("hello world", "s")
        );
        assert_ne!(
            fingerprint("hello world", "s"),
            fingerprint("hello world", "t")
        );
        assert_ne!(
            fingerprint("hello world", "s"),
            fingerprint("hello mars", "s")
        );
    }
}
