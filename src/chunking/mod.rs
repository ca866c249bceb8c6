//! Transcript chunking into overlapping fixed-size passages.
//!
//! Windows are measured in characters. Window `i` starts at
//! `i * (chunk_size - overlap)`; the last window is truncated to the end of
//! the text and never padded.

mod source;

pub use source::TranscriptSource;

use crate::config::ChunkingSettings;
use crate::error::{Result, SvarError};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// A passage of transcript text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Derived from `(source_id, sequence_index)`.
    pub id: Uuid,
    pub source_id: String,
    pub sequence_index: u32,
    pub text: String,
    /// Character offset of the first character, inclusive.
    pub start_offset: usize,
    /// Character offset one past the last character.
    pub end_offset: usize,
    /// Source title, used as the citation label.
    pub title: Option<String>,
    /// Source URL, if known.
    pub url: Option<String>,
}

impl Chunk {
    /// Stable chunk id; re-chunking a source reproduces the same ids.
    pub fn derive_id(source_id: &str, sequence_index: u32) -> Uuid {
        let key = format!("svar:chunk:{}:{}", source_id, sequence_index);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    /// Label to show next to a citation.
    pub fn display_label(&self) -> String {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.source_id.clone())
    }
}

/// Window parameters for chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkingConfig {
    /// Validate `0 < overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if overlap == 0 || overlap >= chunk_size {
            return Err(SvarError::MalformedInput(format!(
                "overlap must satisfy 0 < overlap < chunk_size (got overlap={}, chunk_size={})",
                overlap, chunk_size
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl TryFrom<&ChunkingSettings> for ChunkingConfig {
    type Error = SvarError;

    fn try_from(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.overlap)
    }
}

/// Split `text` into overlapping windows tagged with `source_id`.
///
/// Empty text yields no chunks; text no longer than `chunk_size` yields one.
pub fn chunk_text(text: &str, source_id: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    // Byte position of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let mut chunks = Vec::new();
    if total_chars == 0 {
        return chunks;
    }

    let mut start = 0usize;
    let mut sequence_index = 0u32;
    loop {
        let end = (start + config.chunk_size).min(total_chars);
        chunks.push(Chunk {
            id: Chunk::derive_id(source_id, sequence_index),
            source_id: source_id.to_string(),
            sequence_index,
            text: text[boundaries[start]..boundaries[end]].to_string(),
            start_offset: start,
            end_offset: end,
            title: None,
            url: None,
        });

        if end == total_chars {
            break;
        }
        start += config.step();
        sequence_index += 1;
    }

    debug!(
        source_id,
        chars = total_chars,
        chunk_count = chunks.len(),
        "Text chunked"
    );
    chunks
}

/// Chunk a loaded transcript, labelling every chunk with its title and URL.
pub fn chunk_source(source: &TranscriptSource, config: &ChunkingConfig) -> Vec<Chunk> {
    chunk_text(&source.text, &source.id, config)
        .into_iter()
        .map(|mut chunk| {
            chunk.title = source.title.clone();
            chunk.url = source.url.clone();
            chunk
        })
        .collect()
}

/// Rebuild contiguous text from chunks of one source, dropping overlap.
///
/// Chunks may arrive in any order. Gaps between non-adjacent chunks are
/// joined with a blank line.
pub fn stitch(chunks: &[Chunk]) -> String {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.sequence_index);

    let mut out = String::new();
    let mut covered_to: Option<usize> = None;

    for chunk in ordered {
        match covered_to {
            Some(end) if chunk.start_offset <= end => {
                let skip = end - chunk.start_offset;
                out.extend(chunk.text.chars().skip(skip));
            }
            Some(_) => {
                out.push_str("\n\n");
                out.push_str(&chunk.text);
            }
            None => out.push_str(&chunk.text),
        }
        covered_to = Some(covered_to.map_or(chunk.end_offset, |e| e.max(chunk.end_offset)));
    }

    out
}
