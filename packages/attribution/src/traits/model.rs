//! Model-invocation traits.
//!
//! The pipeline owns retry, backoff and truncation policy. Implementations
//! make exactly one call per invocation and classify failures through
//! [`ModelError`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ModelError;
use crate::types::usage::TokenUsage;

/// Output contract handed to a structured-output model.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    /// Contract name, e.g. "nutrition_candidate"
    pub name: String,

    /// JSON schema the response must satisfy
    pub schema: Value,
}

/// A parsed structured response.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub value: Value,
    pub usage: TokenUsage,
}

impl ModelResponse {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            usage: TokenUsage::default(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// A language model that can emit JSON conforming to a schema.
#[async_trait]
pub trait StructuredModel: Send + Sync {
    /// Generate a record for `user` under `system`, constrained by `schema`.
    async fn generate_structured(
        &self,
        system: &str,
        user: &str,
        schema: &ResponseSchema,
    ) -> Result<ModelResponse, ModelError>;
}

/// Text read off an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub usage: TokenUsage,
}

/// Image-to-text pass for label photos and nutrition panels.
#[async_trait]
pub trait ImageTranscriber: Send + Sync {
    async fn transcribe(&self, image: &[u8], mime_type: &str) -> Result<Transcript, ModelError>;
}

/// Transcriber for pipelines that never see images. Every call fails, which
/// the extractor turns into an empty transcription.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranscriber;

#[async_trait]
impl ImageTranscriber for NoTranscriber {
    async fn transcribe(&self, _image: &[u8], _mime_type: &str) -> Result<Transcript, ModelError> {
        Err(ModelError::Fatal("no image transcriber configured".into()))
    }
}
