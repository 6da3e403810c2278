//! OpenAI implementation of the model traits.
//!
//! # Example
//!
//! ```rust,ignore
//! use product_attribution::ai::OpenAIModel;
//! use product_attribution::security::ModelSettings;
//!
//! let model = Arc::new(OpenAIModel::new(ModelSettings::from_env()?));
//! let pipeline = Pipeline::new(SchemaRegistry::builtin(), model.clone(), model, config);
//! ```

use async_trait::async_trait;
use openai_client::{OpenAIClient, OpenAIError, StructuredRequest, Usage};
use std::time::Duration;

use crate::error::ModelError;
use crate::pipeline::prompts::TRANSCRIBE_PROMPT;
use crate::security::ModelSettings;
use crate::traits::model::{ImageTranscriber, ModelResponse, ResponseSchema, StructuredModel, Transcript};
use crate::types::usage::TokenUsage;

/// OpenAI-backed structured-output model and image transcriber.
#[derive(Clone)]
pub struct OpenAIModel {
    client: OpenAIClient,
    model: String,
    vision_model: String,
    temperature: f32,
}

impl OpenAIModel {
    pub fn new(settings: ModelSettings) -> Self {
        let mut client = OpenAIClient::new(settings.api_key.expose())
            .with_timeout(Duration::from_secs(settings.request_timeout_secs));
        if let Some(base_url) = &settings.base_url {
            client = client.with_base_url(base_url);
        }

        Self {
            client,
            model: settings.model,
            vision_model: settings.vision_model,
            temperature: settings.temperature,
        }
    }

    /// Get the current model name.
    pub fn model(&self) -> &str {
        &self.model
    }
}

fn usage(raw: Option<Usage>) -> TokenUsage {
    raw.map(|u| TokenUsage::new(u.prompt_tokens as u64, u.completion_tokens as u64))
        .unwrap_or_default()
}

/// Classify a client error for the pipeline's retry policy.
fn model_error(e: OpenAIError) -> ModelError {
    match e {
        OpenAIError::Timeout { seconds } => ModelError::Timeout { seconds },
        OpenAIError::Api { ref message, .. } if message.contains("context_length_exceeded") => {
            ModelError::ContextLength(message.clone())
        }
        e if e.is_transient() => ModelError::Transient(e.to_string()),
        OpenAIError::Refusal(reason) => ModelError::Refusal(reason),
        OpenAIError::Parse(reason) => ModelError::InvalidResponse(reason),
        other => ModelError::Fatal(other.to_string()),
    }
}

#[async_trait]
impl StructuredModel for OpenAIModel {
    async fn generate_structured(
        &self,
        system: &str,
        user: &str,
        schema: &ResponseSchema,
    ) -> Result<ModelResponse, ModelError> {
        let request = StructuredRequest::new(&self.model, system, user, schema.schema.clone())
            .with_schema_name(&schema.name)
            .with_temperature(self.temperature);

        let response = self.client.structured_output(request).await.map_err(model_error)?;
        let value = serde_json::from_str(&response.content)
            .map_err(|e| ModelError::InvalidResponse(format!("{}: {e}", schema.name)))?;

        Ok(ModelResponse::new(value).with_usage(usage(response.usage)))
    }
}

#[async_trait]
impl ImageTranscriber for OpenAIModel {
    async fn transcribe(&self, image: &[u8], mime_type: &str) -> Result<Transcript, ModelError> {
        let response = self
            .client
            .describe_image(&self.vision_model, TRANSCRIBE_PROMPT, image, mime_type)
            .await
            .map_err(model_error)?;

        Ok(Transcript {
            text: response.content,
            usage: usage(response.usage),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(
            model_error(OpenAIError::Timeout { seconds: 60 }),
            ModelError::Timeout { seconds: 60 }
        );
        assert!(model_error(OpenAIError::Api { status: 503, message: "busy".into() }).is_transient());
        assert!(matches!(
            model_error(OpenAIError::Api {
                status: 400,
                message: r#"{"error":{"code":"context_length_exceeded"}}"#.into()
            }),
            ModelError::ContextLength(_)
        ));
        assert!(matches!(model_error(OpenAIError::Refusal("no".into())), ModelError::Refusal(_)));
        assert!(matches!(model_error(OpenAIError::Parse("eof".into())), ModelError::InvalidResponse(_)));
        assert!(matches!(model_error(OpenAIError::Config("key".into())), ModelError::Fatal(_)));
    }

    #[test]
    fn test_usage_conversion() {
        let converted = usage(Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }));
        assert_eq!(converted, TokenUsage::new(10, 5));
        assert_eq!(usage(None), TokenUsage::default());
    }
}
