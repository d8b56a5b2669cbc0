//! Folds chat-completion chunks into one assistant message.
//!
//! State machine: Idle → Accumulating → Finished. The first content delta
//! starts the message, later deltas grow it in place, and `[DONE]` (or the
//! stream closing) freezes it. Malformed frames are counted and skipped.

use serde_json::Value;
use tracing::warn;

use super::frame::SseFrame;

/// One content fragment extracted from a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDelta {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AccumulatorState {
    /// No content delta seen yet.
    Idle,
    /// Message in progress.
    Accumulating(String),
    /// Stream ended; the text no longer changes.
    Finished(String),
}

/// Single owner of the running assistant text.
#[derive(Debug)]
pub struct DeltaAccumulator {
    state: AccumulatorState,
    malformed_frames: usize,
    delta_count: usize,
    saw_done: bool,
}

impl Default for DeltaAccumulator {
    fn default() -> Self {
        Self {
            state: AccumulatorState::Idle,
            malformed_frames: 0,
            delta_count: 0,
            saw_done: false,
        }
    }
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one frame. Returns the delta it contributed, if any.
    pub fn accept(&mut self, frame: &SseFrame) -> Option<ChunkDelta> {
        if self.is_finished() {
            return None;
        }

        let raw = match frame {
            SseFrame::Done => {
                self.saw_done = true;
                self.close();
                return None;
            }
            SseFrame::Data(raw) => raw,
        };

        let payload: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                self.malformed_frames += 1;
                warn!(error = %e, frame = %raw, "skipping malformed stream frame");
                return None;
            }
        };

        if let Some(message) = payload.pointer("/error/message").and_then(Value::as_str) {
            warn!(%message, "error payload in stream");
            return None;
        }

        let text = extract_content(&payload)?;
        self.append(text);
        Some(ChunkDelta {
            text: text.to_string(),
        })
    }

    /// Running text. Empty until the first delta.
    pub fn current_text(&self) -> &str {
        match &self.state {
            AccumulatorState::Idle => "",
            AccumulatorState::Accumulating(text) | AccumulatorState::Finished(text) => text,
        }
    }

    /// Whether any content delta has arrived.
    pub fn has_message(&self) -> bool {
        self.delta_count > 0
    }

    /// Mark the end of the stream (close, cancel or transport error),
    /// keeping the text accumulated so far.
    pub fn close(&mut self) {
        self.state = match std::mem::replace(&mut self.state, AccumulatorState::Idle) {
            AccumulatorState::Idle => AccumulatorState::Finished(String::new()),
            AccumulatorState::Accumulating(text) | AccumulatorState::Finished(text) => {
                AccumulatorState::Finished(text)
            }
        };
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, AccumulatorState::Finished(_))
    }

    /// Whether the `[DONE]` terminator ended the stream.
    pub fn saw_done(&self) -> bool {
        self.saw_done
    }

    pub fn malformed_frames(&self) -> usize {
        self.malformed_frames
    }

    pub fn delta_count(&self) -> usize {
        self.delta_count
    }

    /// Consume the accumulator, returning the final text.
    pub fn into_text(self) -> String {
        match self.state {
            AccumulatorState::Idle => String::new(),
            AccumulatorState::Accumulating(text) | AccumulatorState::Finished(text) => text,
        }
    }

    fn append(&mut self, fragment: &str) {
        self.delta_count += 1;
        if let AccumulatorState::Accumulating(text) = &mut self.state {
            text.push_str(fragment);
        } else if self.state == AccumulatorState::Idle {
            self.state = AccumulatorState::Accumulating(fragment.to_string());
        }
    }
}

/// `choices[0].delta.content`, when it is a non-empty string.
fn extract_content(payload: &Value) -> Option<&str> {
    payload
        .get("choices")?
        .as_array()?
        .first()?
        .get("delta")?
        .get("content")?
        .as_str()
        .filter(|s| !s.is_empty())
}
