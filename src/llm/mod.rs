//! Completion transport for the policy assistant.
//!
//! `CompletionTransport` is the seam between the assistant and the network:
//! the reqwest-backed `OpenAiClient` in production, scripted fakes in tests.

pub mod client;
pub mod prompts;
pub mod types;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_stream::Stream;

pub use client::{AuthScheme, LlmError, OpenAiClient, OPENAI_CHAT_URL};
pub use types::{CompletionRequest, Message};

use crate::config::AssistantConfig;

/// Raw response body of a streamed completion.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Single completion; trimmed content of the first choice.
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, LlmError>;

    /// Streamed completion; the body as it arrives.
    async fn open_stream(&self, request: &CompletionRequest) -> Result<ByteStream, LlmError>;
}

/// Build a client from resolved configuration.
pub fn client_from_config(config: &AssistantConfig) -> Result<OpenAiClient, LlmError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        LlmError::MissingApiKey(
            "no API key configured. Set OPENAI_API_KEY or api_key in ~/.policy-copilot/config.yaml".into(),
        )
    })?;
    Ok(OpenAiClient::with_endpoint(api_key, config.endpoint().to_string()))
}
