//! Testing utilities including mock implementations.
//!
//! These are useful for exercising the pipeline without making real model
//! calls.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, RwLock};

use regex::Regex;

use crate::error::ModelError;
use crate::traits::model::{ImageTranscriber, ModelResponse, ResponseSchema, StructuredModel, Transcript};
use crate::types::usage::TokenUsage;

static RE_DOCUMENT_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<DOCUMENT url="([^"]*)""#).unwrap());

/// Suffix of the output contract name used by the reconciler.
const FINALIZED_SUFFIX: &str = "_finalized";

/// A mock structured-output model.
///
/// Extraction calls are answered per document URL (read from the prompt),
/// falling back to a default record. Reconciliation calls are answered per
/// contract name, falling back to a default finalized response.
#[derive(Default)]
pub struct MockModel {
    /// Candidate responses by document URL
    candidates: Arc<RwLock<HashMap<String, Value>>>,

    /// Candidate response for unknown URLs
    default_candidate: Arc<RwLock<Option<Value>>>,

    /// Finalizer responses by contract name
    finalized_by_schema: Arc<RwLock<HashMap<String, Value>>>,

    /// Finalizer response for unknown contracts
    default_finalized: Arc<RwLock<Option<Value>>>,

    /// One-shot failures, consumed in order by any call
    failures: Arc<RwLock<VecDeque<ModelError>>>,

    /// URLs whose extraction always fails
    failing_urls: Arc<RwLock<HashMap<String, ModelError>>>,

    /// URLs whose extraction panics
    panicking_urls: Arc<RwLock<Vec<String>>>,

    /// Usage reported on every successful response
    usage: TokenUsage,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockModelCall>>>,
}

/// Record of a call made to the mock model.
#[derive(Debug, Clone)]
pub struct MockModelCall {
    pub system: String,
    pub user: String,
    pub schema_name: String,
}

impl MockModelCall {
    pub fn is_finalization(&self) -> bool {
        self.schema_name.ends_with(FINALIZED_SUFFIX)
    }
}

impl MockModel {
    /// Create a new mock model. Unknown documents get `{"is_match": false}`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predefined candidate response for a document URL.
    pub fn with_candidate(self, url: impl Into<String>, response: Value) -> Self {
        self.candidates.write().unwrap().insert(url.into(), response);
        self
    }

    /// Candidate response for documents without a predefined one.
    pub fn with_default(self, response: Value) -> Self {
        *self.default_candidate.write().unwrap() = Some(response);
        self
    }

    /// Finalizer response for every task without its own.
    pub fn with_finalized(self, response: Value) -> Self {
        *self.default_finalized.write().unwrap() = Some(response);
        self
    }

    /// Finalizer response for one task.
    pub fn with_finalized_for(self, task: &str, response: Value) -> Self {
        self.finalized_by_schema
            .write()
            .unwrap()
            .insert(format!("{task}{FINALIZED_SUFFIX}"), response);
        self
    }

    /// Fail the next call with `error`. Queued failures are used in order.
    pub fn fail_next(self, error: ModelError) -> Self {
        self.failures.write().unwrap().push_back(error);
        self
    }

    /// Fail every extraction of `url` with `error`.
    pub fn fail_url(self, url: impl Into<String>, error: ModelError) -> Self {
        self.failing_urls.write().unwrap().insert(url.into(), error);
        self
    }

    /// Panic when extracting `url`.
    pub fn panic_on_url(self, url: impl Into<String>) -> Self {
        self.panicking_urls.write().unwrap().push(url.into());
        self
    }

    /// Report `usage` on every successful response.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Get all calls made to this mock, failed ones included.
    pub fn calls(&self) -> Vec<MockModelCall> {
        self.calls.read().unwrap().clone()
    }

    /// Calls made by the reconciler.
    pub fn finalization_calls(&self) -> Vec<MockModelCall> {
        self.calls().into_iter().filter(MockModelCall::is_finalization).collect()
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn candidate_response(&self, user: &str) -> Result<Value, ModelError> {
        let url = RE_DOCUMENT_URL
            .captures(user)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        if self.panicking_urls.read().unwrap().contains(&url) {
            panic!("mock model panicked on {url}");
        }
        if let Some(error) = self.failing_urls.read().unwrap().get(&url) {
            return Err(error.clone());
        }

        Ok(self
            .candidates
            .read()
            .unwrap()
            .get(&url)
            .cloned()
            .or_else(|| self.default_candidate.read().unwrap().clone())
            .unwrap_or_else(|| json!({ "is_match": false })))
    }

    fn finalized_response(&self, schema_name: &str) -> Result<Value, ModelError> {
        self.finalized_by_schema
            .read()
            .unwrap()
            .get(schema_name)
            .cloned()
            .or_else(|| self.default_finalized.read().unwrap().clone())
            .ok_or_else(|| ModelError::Fatal(format!("no mock response for {schema_name}")))
    }
}

#[async_trait]
impl StructuredModel for MockModel {
    async fn generate_structured(
        &self,
        system: &str,
        user: &str,
        schema: &ResponseSchema,
    ) -> Result<ModelResponse, ModelError> {
        self.calls.write().unwrap().push(MockModelCall {
            system: system.to_string(),
            user: user.to_string(),
            schema_name: schema.name.clone(),
        });

        if let Some(error) = self.failures.write().unwrap().pop_front() {
            return Err(error);
        }

        let value = if schema.name.ends_with(FINALIZED_SUFFIX) {
            self.finalized_response(&schema.name)?
        } else {
            self.candidate_response(user)?
        };

        Ok(ModelResponse::new(value).with_usage(self.usage))
    }
}

/// A mock image transcriber.
#[derive(Default)]
pub struct MockTranscriber {
    text: String,
    fail: bool,
    calls: AtomicUsize,
}

impl MockTranscriber {
    /// Returns empty text for every image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `text` for every image.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Fail every call.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageTranscriber for MockTranscriber {
    async fn transcribe(&self, _image: &[u8], _mime_type: &str) -> Result<Transcript, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ModelError::Timeout { seconds: 30 });
        }
        Ok(Transcript {
            text: self.text.clone(),
            usage: TokenUsage::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(name: &str) -> ResponseSchema {
        ResponseSchema {
            name: name.to_string(),
            schema: json!({}),
        }
    }

    #[tokio::test]
    async fn test_candidate_by_document_url() {
        let model = MockModel::new().with_candidate("https://a.example", json!({ "is_match": true }));

        let hit = model
            .generate_structured("sys", "<DOCUMENT url=\"https://a.example\" tier=\"tier_1\">", &schema("t_candidate"))
            .await
            .unwrap();
        assert_eq!(hit.value["is_match"], true);

        let miss = model
            .generate_structured("sys", "<DOCUMENT url=\"https://b.example\" tier=\"tier_1\">", &schema("t_candidate"))
            .await
            .unwrap();
        assert_eq!(miss.value["is_match"], false);

        // Check calls were recorded
        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert!(!calls[0].is_finalization());
    }

    #[tokio::test]
    async fn test_failures_are_consumed_in_order() {
        let model = MockModel::new()
            .fail_next(ModelError::Timeout { seconds: 1 })
            .fail_next(ModelError::Refusal("no".into()));

        let first = model.generate_structured("s", "u", &schema("x_candidate")).await;
        let second = model.generate_structured("s", "u", &schema("x_candidate")).await;
        let third = model.generate_structured("s", "u", &schema("x_candidate")).await;

        assert_eq!(first.unwrap_err(), ModelError::Timeout { seconds: 1 });
        assert_eq!(second.unwrap_err(), ModelError::Refusal("no".into()));
        assert!(third.is_ok());
        assert_eq!(model.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_finalized_response_by_task() {
        let model = MockModel::new()
            .with_finalized(json!({ "which": "default" }))
            .with_finalized_for("allergens", json!({ "which": "allergens" }));

        let specific = model.generate_structured("s", "u", &schema("allergens_finalized")).await.unwrap();
        let fallback = model.generate_structured("s", "u", &schema("nutrition_finalized")).await.unwrap();

        assert_eq!(specific.value["which"], "allergens");
        assert_eq!(fallback.value["which"], "default");
        assert_eq!(model.finalization_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_transcriber() {
        let transcriber = MockTranscriber::new().with_text("Calories 200");
        let transcript = transcriber.transcribe(&[1, 2], "image/png").await.unwrap();
        assert_eq!(transcript.text, "Calories 200");
        assert_eq!(transcriber.call_count(), 1);

        assert!(MockTranscriber::new().failing().transcribe(&[], "image/png").await.is_err());
    }
}
