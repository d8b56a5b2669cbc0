//! Wire types for OpenAI-compatible chat completions.
//!
//! Field names and the model literal are part of the compatibility surface
//! with the endpoint, so they are fixed here rather than configurable.

use serde::{Deserialize, Serialize};

use super::prompts;

/// Model requested from the endpoint.
pub const MODEL: &str = "gpt-4";
/// Token limit for streamed chat replies.
pub const CHAT_MAX_TOKENS: u32 = 500;
/// Token limit for single-shot code suggestions.
pub const SUGGESTION_MAX_TOKENS: u32 = 100;
pub const TEMPERATURE: f64 = 0.7;

// ── Messages ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

// ── Request ──

/// Request body for `/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub n: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    pub temperature: f64,
}

impl CompletionRequest {
    /// Compose a request. Streaming requests are chat turns (500 tokens,
    /// `stream: true`); non-streaming ones are code suggestions (100 tokens,
    /// no `stream` field).
    pub fn build(system_prompt: &str, user_prompt: &str, document_context: &str, streaming: bool) -> Self {
        let (content, max_tokens) = if streaming {
            (prompts::chat_user_content(user_prompt, document_context), CHAT_MAX_TOKENS)
        } else {
            (
                prompts::suggestion_user_content(user_prompt, document_context),
                SUGGESTION_MAX_TOKENS,
            )
        };

        Self {
            model: MODEL.into(),
            messages: vec![Message::system(system_prompt), Message::user(&content)],
            max_tokens,
            n: 1,
            stream: streaming,
            temperature: TEMPERATURE,
        }
    }

    /// Streamed chat turn about `document`.
    pub fn chat(message: &str, document: &str) -> Self {
        Self::build(prompts::CHAT_SYSTEM_PROMPT, message, document, true)
    }

    /// Single-shot suggestion for `prompt`.
    pub fn suggestion(prompt: &str, context: &str) -> Self {
        Self::build(prompts::SUGGESTION_SYSTEM_PROMPT, prompt, context, false)
    }
}

// ── Non-streamed response ──

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// `{"error": {"message": ...}}` as returned by the endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ApiErrorBody,
}

impl CompletionResponse {
    /// Trimmed content of the first choice, if any.
    pub fn text(&self) -> Option<String> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(|s| s.trim().to_string())
    }
}
