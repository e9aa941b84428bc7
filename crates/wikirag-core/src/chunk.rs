//! Sentence-boundary slicer with context overlap.
//!
//! Splits a document's content into [`Slice`]s whose core span is at most
//! `max_length` characters. A cursor walks the content from offset 0; each
//! step tentatively ends at `start + max_length` and, if that is not the end
//! of the content, backs up to the nearest sentence terminator (`。`, `！`,
//! `？`) or newline. If no boundary exists in the window the cut is forced at
//! `start + max_length` so the cursor always advances.
//!
//! The emitted text is padded with up to `context_length` characters on
//! each side of the core span, clamped to the content bounds. Cores never
//! overlap; padded slices overlap their neighbours.
//!
//! All lengths and offsets are counted in Unicode scalar values, not bytes.
//!
//! # Example
//!
//! ```rust
//! use wikirag_core::chunk::slice_content;
//!
//! let slices = slice_content("0123456789", 4, 2).unwrap();
//! assert_eq!(slices, vec!["012345", "23456789", "6789"]);
//! ```

use thiserror::Error;

use crate::models::{Document, Slice};

/// Default maximum core span, in characters.
pub const DEFAULT_MAX_LENGTH: usize = 5000;

/// Default context padding on each side, in characters.
pub const DEFAULT_CONTEXT_LENGTH: usize = 50;

/// Characters a slice prefers to be cut at.
const BOUNDARY_CHARS: [char; 4] = ['。', '！', '？', '\n'];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("max_length must be greater than zero")]
    ZeroMaxLength,
}

/// Half-open core span `[start, end)` of a slice, in character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceSpan {
    pub start: usize,
    pub end: usize,
}

impl SliceSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Compute the non-overlapping core spans for `content`.
///
/// The spans partition `[0, char_count)` in order. Returns an empty vector
/// for empty content.
pub fn slice_spans(content: &str, max_length: usize) -> Result<Vec<SliceSpan>, ChunkingError> {
    let chars: Vec<char> = content.chars().collect();
    spans_over(&chars, max_length)
}

fn spans_over(chars: &[char], max_length: usize) -> Result<Vec<SliceSpan>, ChunkingError> {
    if max_length == 0 {
        return Err(ChunkingError::ZeroMaxLength);
    }

    let len = chars.len();
    let mut spans = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = (start + max_length).min(len);
        if end < len {
            while end > start && !BOUNDARY_CHARS.contains(&chars[end]) {
                end -= 1;
            }
            if end == start {
                end = start + max_length;
            }
        }
        spans.push(SliceSpan { start, end });
        start = end;
    }

    Ok(spans)
}

/// Slice `content` into context-padded strings.
///
/// Deterministic and side-effect free. See the module docs for the
/// algorithm.
pub fn slice_content(
    content: &str,
    max_length: usize,
    context_length: usize,
) -> Result<Vec<String>, ChunkingError> {
    let chars: Vec<char> = content.chars().collect();
    let spans = spans_over(&chars, max_length)?;

    // Byte offset of every char position, plus the end of the string.
    let offsets: Vec<usize> = content
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(content.len()))
        .collect();

    Ok(spans
        .iter()
        .map(|span| {
            let lo = span.start.saturating_sub(context_length);
            let hi = (span.end + context_length).min(chars.len());
            content[offsets[lo]..offsets[hi]].to_string()
        })
        .collect())
}

/// Slice a whole document, tagging each piece with its origin.
///
/// Slice indices are 1-based and contiguous.
pub fn slice_document(
    doc: &Document,
    max_length: usize,
    context_length: usize,
) -> Result<Vec<Slice>, ChunkingError> {
    Ok(slice_content(&doc.content, max_length, context_length)?
        .into_iter()
        .enumerate()
        .map(|(i, text)| Slice {
            origin_title: doc.title.clone(),
            slice_index: i + 1,
            text,
        })
        .collect())
}
