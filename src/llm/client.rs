//! Raw HTTP client for OpenAI-compatible chat completion endpoints.
//!
//! No session awareness, just requests via reqwest. Failures are returned
//! to the caller; nothing is retried.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use tokio_stream::StreamExt;
use tracing::debug;

use super::types::{CompletionRequest, CompletionResponse, ErrorEnvelope};
use super::{ByteStream, CompletionTransport};
use crate::stream::StreamError;

/// Public OpenAI chat completions endpoint.
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Errors from completion requests.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("missing API key: {0}")]
    MissingApiKey(String),
}

/// How the API key is attached to requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>` (api.openai.com).
    Bearer,
    /// `api-key: <key>` (Azure OpenAI and compatible gateways).
    ApiKeyHeader,
}

impl AuthScheme {
    pub fn for_endpoint(endpoint: &str) -> Self {
        if endpoint == OPENAI_CHAT_URL {
            AuthScheme::Bearer
        } else {
            AuthScheme::ApiKeyHeader
        }
    }
}

/// Client bound to one endpoint and key.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    endpoint: String,
    auth: AuthScheme,
}

impl OpenAiClient {
    /// Client for the public OpenAI endpoint.
    pub fn new(api_key: String) -> Self {
        Self::with_endpoint(api_key, OPENAI_CHAT_URL.into())
    }

    /// Client for a custom endpoint (Azure, proxies, mock servers).
    pub fn with_endpoint(api_key: String, endpoint: String) -> Self {
        let auth = AuthScheme::for_endpoint(&endpoint);
        Self {
            http: Client::new(),
            api_key,
            endpoint,
            auth,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        self.auth
    }

    fn post(&self, request: &CompletionRequest) -> RequestBuilder {
        let builder = self
            .http
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(request);
        match self.auth {
            AuthScheme::Bearer => builder.bearer_auth(&self.api_key),
            AuthScheme::ApiKeyHeader => builder.header("api-key", &self.api_key),
        }
    }

    /// Send a non-streamed request and return the trimmed content of the
    /// first choice. `Ok(None)` when the endpoint returned no choices.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, LlmError> {
        let response = self.post(request).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if status >= 400 {
            return Err(LlmError::Api {
                status,
                message: error_message(&body),
            });
        }

        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse response: {e}")))?;

        if let Some(error) = parsed.error.as_ref() {
            return Err(LlmError::Api {
                status,
                message: error.message.clone(),
            });
        }

        Ok(parsed.text())
    }

    /// Send a streaming request and hand back the raw body stream.
    pub async fn open_stream(&self, request: &CompletionRequest) -> Result<ByteStream, LlmError> {
        let response = self.post(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "(no body)".into());
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        debug!(endpoint = %self.endpoint, "completion stream opened");
        Ok(Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(LlmError::from))))
    }
}

#[async_trait]
impl CompletionTransport for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, LlmError> {
        OpenAiClient::complete(self, request).await
    }

    async fn open_stream(&self, request: &CompletionRequest) -> Result<ByteStream, LlmError> {
        OpenAiClient::open_stream(self, request).await
    }
}

/// The `error.message` of a JSON error body, or the body itself.
fn error_message(body: &str) -> String {
    if body.trim().is_empty() {
        return "(no body)".into();
    }
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}
