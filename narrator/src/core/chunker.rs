//! Splitting long scripts into provider-sized chunks.
//!
//! Chunks are built from whole paragraphs whenever possible. A paragraph
//! that is too long on its own is broken into sentences, and a single
//! sentence that is still too long is kept whole rather than cut mid-word.
//! The output depends only on `(text, max_chars)`, which is what lets a
//! resumed job line its persisted records up with a fresh split.
//!
//! All lengths are counted in Unicode scalar values (`char`s), matching how
//! the provider meters characters.

use thiserror::Error;

use crate::config::CharacterBudget;

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SENTENCE_SEPARATOR: &str = " ";
const SENTENCE_BOUNDARY: &str = ". ";

/// Minutes of audio a full-size chunk produces, low and high estimates.
pub const MINUTES_PER_FULL_CHUNK: (f64, f64) = (5.0, 6.0);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("Input text is empty")]
    EmptyInput,

    #[error("Chunk size must be greater than zero")]
    InvalidBudget,

    #[error("Chunk {index} has {length} characters, above the provider limit of {limit}")]
    SegmentTooLong {
        index: usize,
        length: usize,
        limit: usize,
    },
}

pub type ChunkingResult<T> = Result<T, ChunkingError>;

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Accumulates pieces into chunks no longer than `max_chars`.
struct ChunkBuilder {
    max_chars: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
}

impl ChunkBuilder {
    fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
        }
    }

    /// Append `piece`, closing the current chunk first if it would overflow.
    fn push(&mut self, piece: &str, separator: &str) {
        let piece_len = char_len(piece);

        if self.current.is_empty() {
            self.current.push_str(piece);
            self.current_len = piece_len;
            return;
        }

        let joined_len = self.current_len + char_len(separator) + piece_len;
        if joined_len <= self.max_chars {
            self.current.push_str(separator);
            self.current.push_str(piece);
            self.current_len = joined_len;
        } else {
            self.close();
            self.current.push_str(piece);
            self.current_len = piece_len;
        }
    }

    fn close(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
            self.current_len = 0;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.close();
        self.chunks
    }
}

/// Split a paragraph on `". "`, keeping the period with its sentence.
fn sentences(paragraph: &str) -> impl Iterator<Item = &str> {
    paragraph
        .split_inclusive(SENTENCE_BOUNDARY)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Split `text` into ordered chunks of at most `max_chars` characters.
///
/// A chunk only exceeds `max_chars` when it consists of a single sentence
/// that is longer than the budget.
pub fn split(text: &str, max_chars: usize) -> ChunkingResult<Vec<String>> {
    if max_chars == 0 {
        return Err(ChunkingError::InvalidBudget);
    }
    if text.trim().is_empty() {
        return Err(ChunkingError::EmptyInput);
    }

    let mut builder = ChunkBuilder::new(max_chars);

    for paragraph in text
        .split(PARAGRAPH_SEPARATOR)
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        if char_len(paragraph) <= max_chars {
            builder.push(paragraph, PARAGRAPH_SEPARATOR);
            continue;
        }

        for (i, sentence) in sentences(paragraph).enumerate() {
            let separator = if i == 0 {
                PARAGRAPH_SEPARATOR
            } else {
                SENTENCE_SEPARATOR
            };
            builder.push(sentence, separator);
        }
    }

    Ok(builder.finish())
}

/// Chunker bound to a model's character budget.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    budget: CharacterBudget,
}

impl TextChunker {
    pub fn new(budget: CharacterBudget) -> Self {
        Self { budget }
    }

    /// Split `text` and reject any chunk the provider would refuse.
    pub fn split(&self, text: &str) -> ChunkingResult<Vec<String>> {
        let chunks = split(text, self.budget.chunk_chars)?;

        for (index, chunk) in chunks.iter().enumerate() {
            let length = char_len(chunk);
            if length > self.budget.request_limit {
                return Err(ChunkingError::SegmentTooLong {
                    index,
                    length,
                    limit: self.budget.request_limit,
                });
            }
        }

        Ok(chunks)
    }

    /// Split `text` into a [`ChunkPlan`].
    pub fn plan(&self, text: &str) -> ChunkingResult<ChunkPlan> {
        let chunks = self.split(text)?;
        Ok(ChunkPlan {
            max_chars: self.budget.chunk_chars,
            total_characters: char_len(text),
            chunks,
        })
    }
}

/// The chunks of a script, plus the figures needed to preview a job.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub max_chars: usize,
    pub total_characters: usize,
    pub chunks: Vec<String>,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Character count of every chunk, in order.
    pub fn sizes(&self) -> Vec<usize> {
        self.chunks.iter().map(|c| char_len(c)).collect()
    }

    /// Estimated audio length in minutes, low and high.
    ///
    /// Each chunk contributes in proportion to how full it is.
    pub fn estimated_minutes(&self) -> (f64, f64) {
        let full_chunks: f64 = self
            .sizes()
            .iter()
            .map(|&size| size as f64 / self.max_chars as f64)
            .sum();
        (
            full_chunks * MINUTES_PER_FULL_CHUNK.0,
            full_chunks * MINUTES_PER_FULL_CHUNK.1,
        )
    }
}
