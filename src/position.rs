//! Offset to line/column conversion for document text.
//!
//! Lines and columns are 1-based. Columns count characters, not bytes,
//! so a marker after a multi-byte character still lands on the right cell.

use serde::Serialize;
use thiserror::Error;

/// A 1-based line/column pair inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PositionError {
    #[error("anchor not found: {anchor:?}")]
    NotFound { anchor: String },
}

/// Precomputed line starts for one document snapshot.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    /// Byte offset where each line starts; `line_starts[0]` is always 0.
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { text, line_starts }
    }

    /// Convert a byte offset to a position.
    ///
    /// Offsets past the end clamp to the end of the document, and offsets
    /// inside a multi-byte character snap back to its first byte.
    pub fn position(&self, offset: usize) -> Position {
        let offset = self.clamp(offset);
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts[line_idx];
        let column = self.text[line_start..offset].chars().count() + 1;
        Position {
            line: (line_idx + 1) as u32,
            column: column as u32,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Text of a 1-based line without its terminator. Empty for lines
    /// outside the document.
    pub fn line_text(&self, line: usize) -> &'a str {
        if line == 0 || line > self.line_starts.len() {
            return "";
        }
        let start = self.line_starts[line - 1];
        let end = self
            .line_starts
            .get(line)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        self.text[start..end].trim_end_matches('\r')
    }

    /// Byte offset of a 1-based position, clamped to the line's end.
    pub fn offset(&self, position: Position) -> usize {
        let line = (position.line.max(1) as usize).min(self.line_starts.len());
        let start = self.line_starts[line - 1];
        let text = self.line_text(line);
        let skip = position.column.saturating_sub(1) as usize;
        text.char_indices()
            .nth(skip)
            .map(|(i, _)| start + i)
            .unwrap_or(start + text.len())
    }

    fn clamp(&self, offset: usize) -> usize {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }
}

/// Find the first occurrence of `anchor` at or after `start_offset` and
/// return its position.
///
/// Plain substring search: when the same text appears twice after
/// `start_offset`, the earlier occurrence wins.
pub fn locate(document: &str, anchor: &str, start_offset: usize) -> Result<Position, PositionError> {
    let offset = find_from(document, anchor, start_offset).ok_or_else(|| PositionError::NotFound {
        anchor: anchor.to_string(),
    })?;
    Ok(LineIndex::new(document).position(offset))
}

/// Locate `node_anchor`, then the first `attribute_name` at or after it.
pub fn locate_column_of(
    document: &str,
    node_anchor: &str,
    attribute_name: &str,
) -> Result<Position, PositionError> {
    let node = find_from(document, node_anchor, 0).ok_or_else(|| PositionError::NotFound {
        anchor: node_anchor.to_string(),
    })?;
    let attr = find_from(document, attribute_name, node).ok_or_else(|| PositionError::NotFound {
        anchor: attribute_name.to_string(),
    })?;
    Ok(LineIndex::new(document).position(attr))
}

fn find_from(haystack: &str, needle: &str, start: usize) -> Option<usize> {
    if start > haystack.len() || !haystack.is_char_boundary(start) {
        return None;
    }
    haystack[start..].find(needle).map(|i| start + i)
}
