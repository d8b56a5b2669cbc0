//! SSE frame parser: chunks of response body in, complete `data:` frames out.
//!
//! Chunks may split a line (or a UTF-8 character) anywhere. Only complete
//! `\n`-terminated lines are ever turned into frames; whatever follows the
//! last newline waits in the buffer for the next chunk.

use tracing::{debug, trace};

use super::StreamError;

const DATA_PREFIX: &str = "data: ";
const DONE_LINE: &str = "data: [DONE]";
const DONE_SENTINEL: &str = "[DONE]";

/// One complete SSE data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Payload after the `data: ` prefix. Usually JSON, possibly malformed.
    Data(String),
    /// The `data: [DONE]` terminator.
    Done,
}

impl SseFrame {
    /// The payload as it appeared on the wire, prefix stripped.
    pub fn raw(&self) -> &str {
        match self {
            SseFrame::Data(raw) => raw,
            SseFrame::Done => DONE_SENTINEL,
        }
    }
}

/// Long-lived parser for one response body.
#[derive(Debug, Default)]
pub struct FrameParser {
    /// Text after the last newline seen so far.
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending_bytes: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed decoded text. Never fails: lines that are not data lines are
    /// dropped silently.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buffer.push_str(chunk);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete.split('\n').filter_map(parse_line).collect()
    }

    /// Feed raw bytes, decoding UTF-8 across chunk boundaries.
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, StreamError> {
        self.pending_bytes.extend_from_slice(chunk);
        let bytes = std::mem::take(&mut self.pending_bytes);

        let valid_up_to = match std::str::from_utf8(&bytes) {
            Ok(_) => bytes.len(),
            // Incomplete sequence at the end: keep it for the next chunk.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(StreamError::Decode {
                    offset: e.valid_up_to(),
                });
            }
        };

        let (text, tail) = bytes.split_at(valid_up_to);
        let text = std::str::from_utf8(text).map_err(|e| StreamError::Decode {
            offset: e.valid_up_to(),
        })?;
        let frames = self.feed(text);
        self.pending_bytes = tail.to_vec();
        Ok(frames)
    }

    /// Bytes currently held back waiting for a newline or the rest of a
    /// character.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.pending_bytes.len()
    }

    /// End of input. A trailing partial line is never a frame; it is
    /// discarded and its length returned.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buffered_len();
        if dropped > 0 {
            debug!(bytes = dropped, "discarding partial SSE line at end of stream");
        }
        self.buffer.clear();
        self.pending_bytes.clear();
        dropped
    }

    /// Stop parsing without flushing. Same effect as [`finish`](Self::finish).
    pub fn cancel(&mut self) -> usize {
        self.finish()
    }
}

fn parse_line(line: &str) -> Option<SseFrame> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed == DONE_LINE {
        return Some(SseFrame::Done);
    }
    match trimmed.strip_prefix(DATA_PREFIX) {
        Some(payload) => Some(SseFrame::Data(payload.to_string())),
        None => {
            trace!(line = %trimmed, "ignoring non-data SSE line");
            None
        }
    }
}
