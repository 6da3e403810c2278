//! Pure OpenAI REST API client
//!
//! A clean, minimal client for the OpenAI API with no domain-specific logic.
//! Supports chat completions, strict structured outputs and image-to-text.
//!
//! # Example
//!
//! ```rust,ignore
//! use openai_client::{OpenAIClient, StructuredRequest};
//!
//! let client = OpenAIClient::from_env()?;
//!
//! let response = client
//!     .structured_output(StructuredRequest::new("gpt-4o", system, user, schema))
//!     .await?;
//! let value: serde_json::Value = serde_json::from_str(&response.content)?;
//! ```

pub mod error;
pub mod schema;
pub mod types;

pub use error::{OpenAIError, Result};
pub use types::*;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Pure OpenAI API client.
#[derive(Clone)]
pub struct OpenAIClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAIClient {
    /// Create a new OpenAI client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Create from environment variable `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| OpenAIError::Config("OPENAI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the per-request timeout (default: 60s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_send_error(&self, e: reqwest::Error) -> OpenAIError {
        if e.is_timeout() {
            OpenAIError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            OpenAIError::Network(e.to_string())
        }
    }

    async fn post_chat<B: serde::Serialize>(&self, body: &B) -> Result<types::ChatResponseRaw> {
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "OpenAI request failed");
                self.map_send_error(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "OpenAI API error");
            return Err(OpenAIError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.map_send_error(e)
            } else {
                OpenAIError::Parse(e.to_string())
            }
        })
    }

    /// Chat completion.
    ///
    /// Send messages to the chat completion API and get a response.
    pub async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        let start = std::time::Instant::now();
        let raw = self.post_chat(&request).await?;

        let message = raw
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| OpenAIError::Parse("No choices in OpenAI response".into()))?;

        debug!(
            model = %request.model,
            duration_ms = start.elapsed().as_millis(),
            "OpenAI chat completion"
        );

        Ok(ChatResponse {
            content: message.content.unwrap_or_default(),
            usage: raw.usage,
        })
    }

    /// Structured output with JSON schema.
    ///
    /// The schema is normalised for strict mode before sending, so the
    /// response is guaranteed to be JSON matching the schema's shape.
    pub async fn structured_output(&self, mut request: StructuredRequest) -> Result<StructuredResponse> {
        let start = std::time::Instant::now();
        schema::enforce_strict(&mut request.response_format.json_schema.schema);

        let raw = self.post_chat(&request).await?;

        let message = raw
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| OpenAIError::Parse("No choices in OpenAI response".into()))?;

        if let Some(refusal) = message.refusal {
            return Err(OpenAIError::Refusal(refusal));
        }

        let content = message
            .content
            .ok_or_else(|| OpenAIError::Parse("Structured response had no content".into()))?;

        debug!(
            model = %request.model,
            schema = %request.response_format.json_schema.name,
            duration_ms = start.elapsed().as_millis(),
            "OpenAI structured output"
        );

        Ok(StructuredResponse {
            content: types::strip_code_blocks(&content).to_string(),
            usage: raw.usage,
        })
    }

    /// Transcribe an image with a vision-capable model.
    ///
    /// The image is sent inline as a base64 data URL.
    pub async fn describe_image(
        &self,
        model: &str,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<ChatResponse> {
        let data_url = format!("data:{};base64,{}", mime_type, BASE64.encode(image));
        let request = ChatRequest::new(model)
            .message(Message::user_with_image(prompt, data_url))
            .temperature(0.2)
            .max_tokens(8192);

        self.chat_completion(request).await
    }
}
