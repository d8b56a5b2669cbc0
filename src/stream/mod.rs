//! Streamed chat-completion consumption.
//!
//! `FrameParser` turns response body chunks into SSE frames;
//! `DeltaAccumulator` turns frames into content deltas and the running
//! assistant text. Both are synchronous and driven by the chat session.

pub mod accumulator;
pub mod frame;

pub use accumulator::{ChunkDelta, DeltaAccumulator};
pub use frame::{FrameParser, SseFrame};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("response body is not valid UTF-8 (at byte {offset} of chunk)")]
    Decode { offset: usize },
}

/// Run a complete body through a fresh parser and accumulator.
///
/// Convenience for buffered bodies and tests; the chat session drives the
/// two halves incrementally instead.
pub fn accumulate_body(chunks: &[&str]) -> DeltaAccumulator {
    let mut parser = FrameParser::new();
    let mut acc = DeltaAccumulator::new();
    for chunk in chunks {
        for frame in parser.feed(chunk) {
            acc.accept(&frame);
        }
    }
    parser.finish();
    acc.close();
    acc
}
