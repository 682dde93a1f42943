//! Document chunking for the ingestion path.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! splits hierarchically by paragraphs, lines, sentences, then words, and
//! carries a configurable overlap between consecutive chunks.

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// Default maximum chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text, metadata and ordinals but
/// no embeddings. Embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no non-whitespace text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text hierarchically: paragraphs → lines → sentences → words.
///
/// Segments longer than `chunk_size` are split with the next separator;
/// words longer than `chunk_size` are split by characters. Adjacent segments
/// are then merged up to `chunk_size`, and each new chunk starts with up to
/// `chunk_overlap` trailing characters of the previous one, cut at a word
/// boundary. Sizes are measured in characters, not bytes.
///
/// Chunk IDs are generated as `{document_id}_{ordinal}` and every chunk
/// inherits the parent document's metadata.
///
/// # Example
///
/// ```rust,ignore
/// use docmind_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1000, 200)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, chunk_overlap: DEFAULT_CHUNK_OVERLAP }
    }
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Chunking`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Chunking("chunk_size must be greater than zero".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Chunking(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into chunk texts.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let separators = ["\n\n", "\n", ". ", "! ", "? ", " "];
        let segments = split_recursive(text, self.chunk_size, &separators);
        merge_segments(segments, self.chunk_size, self.chunk_overlap)
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `text` into segments no longer than `chunk_size` characters.
fn split_recursive(text: &str, chunk_size: usize, separators: &[&str]) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return vec![text.to_string()];
    }
    let Some((separator, remaining)) = separators.split_first() else {
        return split_by_chars(text, chunk_size);
    };

    let mut segments = Vec::new();
    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) > chunk_size {
            segments.extend(split_recursive(piece, chunk_size, remaining));
        } else {
            segments.push(piece.to_string());
        }
    }
    segments
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

fn split_by_chars(text: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(chunk_size).map(|c| c.iter().collect()).collect()
}

/// The last `overlap` characters of `text`, starting at a word boundary.
fn overlap_tail(text: &str, overlap: usize) -> &str {
    if overlap == 0 {
        return "";
    }
    let total = char_len(text);
    if total <= overlap {
        return text.trim_start();
    }
    let start = text.char_indices().nth(total - overlap).map(|(i, _)| i).unwrap_or(0);
    let tail = &text[start..];
    match tail.find(char::is_whitespace) {
        Some(ws) => tail[ws..].trim_start(),
        None => "",
    }
}

fn merge_segments(segments: Vec<String>, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for segment in segments {
        if char_len(&current) + char_len(&segment) <= chunk_size {
            current.push_str(&segment);
            continue;
        }

        let finished = current.trim();
        if !finished.is_empty() {
            chunks.push(finished.to_string());
        }

        let tail = overlap_tail(&current, chunk_overlap);
        current = if !tail.is_empty() && char_len(tail) + char_len(&segment) <= chunk_size {
            format!("{tail}{segment}")
        } else {
            segment
        };
    }

    let finished = current.trim();
    if !finished.is_empty() {
        chunks.push(finished.to_string());
    }

    chunks
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.trim().is_empty() {
            return Vec::new();
        }

        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| Chunk {
                chunk_id: format!("{}_{ordinal}", document.id),
                document_id: document.id.clone(),
                text,
                embedding: Vec::new(),
                metadata: document.metadata.clone(),
                ordinal,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(matches!(RecursiveChunker::new(100, 100), Err(RagError::Chunking(_))));
        assert!(matches!(RecursiveChunker::new(0, 0), Err(RagError::Chunking(_))));
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        let chunker = RecursiveChunker::default();
        assert!(chunker.chunk(&Document::new("d", "   \n ")).is_empty());
    }

    #[test]
    fn short_document_is_one_chunk() {
        let chunker = RecursiveChunker::default();
        let chunks = chunker.chunk(&Document::new("d", "Invoice 42. Total due 1,200 USD."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "d_0");
        assert_eq!(chunks[0].ordinal, 0);
    }

    #[test]
    fn chunks_respect_size_and_ordinals() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let chunker = RecursiveChunker::new(120, 30).unwrap();
        let chunks = chunker.chunk(&Document::new("doc", text).with_metadata("author", "kim"));

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(chunk.text.chars().count() <= 120, "chunk {i} too long");
            assert_eq!(chunk.ordinal, i);
            assert_eq!(chunk.chunk_id, format!("doc_{i}"));
            assert_eq!(chunk.metadata["author"].as_str(), Some("kim"));
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu nu xi";
        let chunker = RecursiveChunker::new(30, 12).unwrap();
        let chunks = chunker.split_text(text);

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split_whitespace().last().unwrap();
            assert!(pair[1].contains(last_word), "{:?} does not overlap {:?}", pair[1], pair[0]);
        }
    }

    #[test]
    fn long_words_are_split_by_chars() {
        let chunker = RecursiveChunker::new(4, 0).unwrap();
        assert_eq!(chunker.split_text("abcdefghij"), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let chunker = RecursiveChunker::new(5, 2).unwrap();
        let chunks = chunker.split_text("ééééé ààààà ççççç");
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
    }
}
