//! Inline code suggestions.
//!
//! Reads the editor context around the cursor and asks for a single,
//! non-streamed completion. Short prefixes never reach the network.

use tracing::debug;

use crate::llm::prompts::{build_suggestion_prompt, SuggestionContext};
use crate::llm::{CompletionRequest, CompletionTransport, LlmError};
use crate::position::LineIndex;
use crate::validate::PolicySchema;

/// Prefixes shorter than this (in characters) get no suggestion.
pub const MIN_PREFIX_CHARS: usize = 3;
/// Lines of context above and below the cursor.
pub const SURROUNDING_LINES: usize = 5;

/// 1-based cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    pub line: usize,
    pub column: usize,
}

pub struct CodeSuggester<T> {
    transport: T,
    schema: PolicySchema,
}

impl<T: CompletionTransport> CodeSuggester<T> {
    pub fn new(transport: T, schema: PolicySchema) -> Self {
        Self { transport, schema }
    }

    /// Suggest text to insert at `cursor`. `Ok(None)` when the prefix is too
    /// short or the endpoint returned nothing.
    pub async fn suggest(&self, document: &str, cursor: CursorPosition) -> Result<Option<String>, LlmError> {
        let Some(request) = self.request_for(document, cursor) else {
            return Ok(None);
        };
        let suggestion = self.transport.complete(&request).await?;
        debug!(found = suggestion.is_some(), "code suggestion finished");
        Ok(suggestion.filter(|s| !s.is_empty()))
    }

    /// The request `suggest` would send, or `None` for short prefixes.
    pub fn request_for(&self, document: &str, cursor: CursorPosition) -> Option<CompletionRequest> {
        let index = LineIndex::new(document);
        let line = index.line_text(cursor.line);
        let prefix: String = line.chars().take(cursor.column.saturating_sub(1)).collect();
        if prefix.chars().count() < MIN_PREFIX_CHARS {
            return None;
        }

        let surrounding = surrounding_lines(&index, cursor.line);
        let ctx = SuggestionContext {
            prompt: &prefix,
            document,
            surrounding: &surrounding,
            previous_line: index.line_text(cursor.line.saturating_sub(1)),
            next_line: index.line_text(cursor.line + 1),
        };
        let prompt = build_suggestion_prompt(&ctx, &self.schema);
        Some(CompletionRequest::suggestion(&prompt, document))
    }
}

fn surrounding_lines(index: &LineIndex<'_>, line: usize) -> String {
    let first = line.saturating_sub(SURROUNDING_LINES).max(1);
    let last = (line + SURROUNDING_LINES).min(index.line_count());
    (first..=last)
        .map(|l| index.line_text(l))
        .collect::<Vec<_>>()
        .join("\n")
}
