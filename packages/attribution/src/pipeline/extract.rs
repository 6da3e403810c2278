//! Per-source extraction.
//!
//! One structured-output call per (product, source document, schema). Image
//! sources go through an image-to-text pass first; HTML is cleaned to text.
//! The returned [`CandidateRecord`] always conforms to the schema.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::coerce::{coerce_candidate, validate};
use super::contract::candidate_contract;
use super::html::clean_html;
use super::prompts::{format_document_prompt, format_parser_prompt};
use super::retry::with_retry;
use crate::error::{AttributionError, ModelError, Result};
use crate::traits::model::{ImageTranscriber, StructuredModel};
use crate::types::config::PipelineConfig;
use crate::types::record::CandidateRecord;
use crate::types::schema::AttributeSchema;
use crate::types::source::{ProductContext, SourceContent, SourceDocument};
use crate::types::usage::{TokenUsage, TokenUsageCounter};

/// Readable text recovered from a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcription {
    Text(String),

    /// Nothing readable. A failed image-to-text pass lands here on purpose:
    /// the source then yields a no-evidence candidate instead of failing.
    Empty { reason: String },
}

impl Transcription {
    fn from_text(text: String, empty_reason: &str) -> Self {
        if text.trim().is_empty() {
            Self::Empty {
                reason: empty_reason.to_string(),
            }
        } else {
            Self::Text(text)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty { .. })
    }
}

/// Rough token estimate used for budgeting (4 bytes per token).
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Cut `text` to fit `budget_tokens`, on a char boundary.
pub fn truncate_to_budget(text: &str, budget_tokens: usize) -> &str {
    let max_bytes = budget_tokens.saturating_mul(4);
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Runs the parser model over single documents.
pub struct Extractor<M, T> {
    model: Arc<M>,
    transcriber: Arc<T>,
    config: PipelineConfig,
    usage: Arc<TokenUsageCounter>,
}

impl<M: StructuredModel, T: ImageTranscriber> Extractor<M, T> {
    pub fn new(model: Arc<M>, transcriber: Arc<T>, config: PipelineConfig) -> Self {
        Self {
            model,
            transcriber,
            config,
            usage: Arc::new(TokenUsageCounter::new()),
        }
    }

    /// Share a usage counter with other pipeline stages.
    pub fn with_usage_counter(mut self, usage: Arc<TokenUsageCounter>) -> Self {
        self.usage = usage;
        self
    }

    /// Tokens spent so far.
    pub fn usage(&self) -> TokenUsage {
        self.usage.snapshot()
    }

    /// Image-to-text pass. Failures become [`Transcription::Empty`].
    pub async fn transcribe(&self, image: &[u8], mime_type: &str) -> Transcription {
        match self.transcriber.transcribe(image, mime_type).await {
            Ok(transcript) => {
                self.usage.record(transcript.usage);
                Transcription::from_text(transcript.text, "image contained no readable text")
            }
            Err(e) => {
                warn!(error = %e, mime_type, "Image transcription failed, using empty text");
                Transcription::Empty {
                    reason: format!("image transcription failed: {e}"),
                }
            }
        }
    }

    /// Text the parser model will read for a document.
    pub async fn document_text(&self, doc: &SourceDocument) -> Transcription {
        match &doc.content {
            SourceContent::Text(text) => Transcription::from_text(text.clone(), "document is empty"),
            SourceContent::Html(html) => {
                Transcription::from_text(clean_html(html), "document has no text after cleaning")
            }
            SourceContent::Image { bytes, .. } if bytes.is_empty() => Transcription::Empty {
                reason: "image is empty".into(),
            },
            SourceContent::Image { bytes, mime_type } => self.transcribe(bytes, mime_type).await,
            SourceContent::Unreadable { reason, .. } => Transcription::Empty { reason: reason.clone() },
        }
    }

    /// Extract one candidate record from one source document.
    ///
    /// Transient model failures are retried with backoff; a context-length
    /// failure halves the document budget for the next attempt. Exhausted
    /// retries surface as [`AttributionError::ExtractionTimeout`].
    pub async fn extract(
        &self,
        schema: &AttributeSchema,
        product: &ProductContext,
        doc: &SourceDocument,
    ) -> Result<CandidateRecord> {
        if let SourceContent::Unreadable { reason, .. } = &doc.content {
            return Err(AttributionError::InvalidSource {
                url: doc.url.clone(),
                reason: reason.clone(),
            });
        }

        let text = match self.document_text(doc).await {
            Transcription::Text(text) => text,
            Transcription::Empty { reason } => {
                info!(url = %doc.url, reason = %reason, "No readable content, recording no-evidence candidate");
                return Ok(CandidateRecord::no_evidence(schema, &doc.url, doc.tier));
            }
        };

        let system = format_parser_prompt(schema);
        let contract = candidate_contract(schema);
        let model = &*self.model;
        let (system, contract, text) = (&system, &contract, &text);
        let mut budget = self.config.token_budget.max(1);

        let retryable = |e: &ModelError| e.is_transient() || matches!(e, ModelError::ContextLength(_));

        let result = with_retry(&self.config.retry, "Extraction", retryable, move |attempt, previous| {
            if let Some(ModelError::ContextLength(_)) = previous {
                budget = (budget / 2).max(1);
            }
            let content = truncate_to_budget(text, budget);
            if content.len() < text.len() {
                warn!(
                    url = %doc.url,
                    attempt,
                    estimated_tokens = estimate_tokens(text),
                    budget,
                    "Document over token budget, truncating"
                );
            }
            let user = format_document_prompt(product, &doc.url, doc.tier, content);
            async move { model.generate_structured(system, &user, contract).await }
        })
        .await;

        let response = match result {
            Ok(response) => response,
            Err(failure) if failure.error.is_transient() => {
                return Err(AttributionError::ExtractionTimeout {
                    url: doc.url.clone(),
                    attempts: failure.attempts,
                    source: failure.error,
                })
            }
            Err(failure) => return Err(AttributionError::Model(failure.error)),
        };

        self.usage.record(response.usage);

        let record = coerce_candidate(schema, &doc.url, doc.tier, &response.value)?;
        if let Err(violations) = validate(schema, &record.fields) {
            let first = &violations[0];
            return Err(AttributionError::MalformedOutput {
                field: first.field.clone(),
                reason: first.reason.clone(),
            });
        }

        debug!(
            url = %doc.url,
            tier = %doc.tier,
            is_match = record.is_match,
            "Candidate extracted"
        );

        Ok(record)
    }
}
