//! Reconciler / finalizer.
//!
//! Merges every candidate for a product and task into one
//! [`FinalizedRecord`]. In [`ArbitrationMode::Model`] a second
//! structured-output call arbitrates and its response is validated: field
//! values are coerced, confidence must be in [0, 1], and every URL must be
//! one of the candidate URLs. In [`ArbitrationMode::Deterministic`] the
//! arbitration policy in [`super::arbitrate`] decides alone.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::arbitrate::{arbitrate, Arbitration};
use super::coerce::coerce_fields;
use super::contract::finalized_contract;
use super::prompts::{digest, format_evidence, format_finalizer_prompt, prompt_version_hash};
use super::retry::with_retry;
use crate::error::{AttributionError, ModelError, Result};
use crate::traits::model::StructuredModel;
use crate::types::config::{ArbitrationMode, PipelineConfig};
use crate::types::record::{CandidateRecord, FinalizedRecord};
use crate::types::schema::FinalizedSchema;
use crate::types::usage::{TokenUsage, TokenUsageCounter};

/// Comparable form of a URL: parsed, fragment dropped, trailing slash
/// trimmed. Falls back to the trimmed string for unparseable input.
fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.as_str().trim_end_matches('/').to_string()
        }
        Err(_) => trimmed.trim_end_matches('/').to_string(),
    }
}

/// Candidate URLs keyed by normalized form, in input order.
struct KnownUrls<'a> {
    urls: Vec<(String, &'a str)>,
}

impl<'a> KnownUrls<'a> {
    fn new(candidates: &'a [CandidateRecord]) -> Self {
        Self {
            urls: candidates
                .iter()
                .map(|c| (normalize_url(&c.url), c.url.as_str()))
                .collect(),
        }
    }

    /// The input URL a model-emitted URL refers to, if any.
    fn resolve(&self, raw: &str) -> Option<&'a str> {
        let wanted = normalize_url(raw);
        self.urls
            .iter()
            .find(|(normalized, _)| *normalized == wanted)
            .map(|(_, original)| *original)
    }
}

/// Scores in [0, 1] pass through. Percentages are accepted when written
/// with `%` or as a number of at least 2; anything else is out of range.
fn parse_confidence(value: Option<&Value>) -> std::result::Result<(f64, Option<String>), String> {
    let (raw, percent) = match value {
        Some(Value::Number(n)) => (n.as_f64(), false),
        Some(Value::String(s)) => {
            let s = s.trim();
            let stripped = s.trim_end_matches('%').trim();
            (stripped.parse::<f64>().ok(), stripped.len() != s.len())
        }
        _ => (None, false),
    };
    let raw = raw
        .filter(|n| n.is_finite())
        .ok_or_else(|| format!("confidence score missing or not a number: {value:?}"))?;

    let as_percent = if percent {
        (0.0..=100.0).contains(&raw)
    } else {
        (2.0..=100.0).contains(&raw)
    };

    if as_percent {
        Ok((raw / 100.0, Some(format!("confidence {raw} read as a percentage"))))
    } else if (0.0..=1.0).contains(&raw) {
        Ok((raw, None))
    } else {
        Err(format!("confidence score {raw} is out of range"))
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => {
            s.split(',').map(|p| p.trim().to_string()).collect()
        }
        _ => Vec::new(),
    }
}

/// Reconciles candidate records into finalized records.
pub struct Reconciler<M> {
    model: Arc<M>,
    config: PipelineConfig,
    usage: Arc<TokenUsageCounter>,
}

impl<M: StructuredModel> Reconciler<M> {
    pub fn new(model: Arc<M>, config: PipelineConfig) -> Self {
        Self {
            model,
            config,
            usage: Arc::new(TokenUsageCounter::new()),
        }
    }

    /// Share a usage counter with other pipeline stages.
    pub fn with_usage_counter(mut self, usage: Arc<TokenUsageCounter>) -> Self {
        self.usage = usage;
        self
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage.snapshot()
    }

    /// Finalize one task from its candidates.
    ///
    /// When no candidate matched the product the record is built without a
    /// model call: every field undetermined, confidence at the configured
    /// no-match level.
    pub async fn finalize(
        &self,
        task: &str,
        candidates: &[CandidateRecord],
        schema: &FinalizedSchema,
    ) -> Result<FinalizedRecord> {
        let evidence = format_evidence(candidates);
        let evidence_digest = digest(&evidence);

        let fallback = arbitrate(&schema.base, candidates, self.config.no_match_confidence)
            .ok_or_else(|| AttributionError::Finalization {
                task: task.to_string(),
                reason: "no candidate records to reconcile".into(),
            })?;

        if !fallback.has_evidence {
            info!(task, candidates = candidates.len(), "No candidate matched the product");
            return Ok(self.from_arbitration(task, schema, fallback, ArbitrationMode::Deterministic, evidence_digest));
        }

        match self.config.arbitration {
            ArbitrationMode::Deterministic => Ok(self.from_arbitration(
                task,
                schema,
                fallback,
                ArbitrationMode::Deterministic,
                evidence_digest,
            )),
            ArbitrationMode::Model => {
                let value = self.invoke_model(task, schema, &evidence).await?;
                self.validate_model_output(task, schema, candidates, &value, fallback, evidence_digest)
            }
        }
    }

    fn from_arbitration(
        &self,
        task: &str,
        schema: &FinalizedSchema,
        arbitration: Arbitration,
        mode: ArbitrationMode,
        evidence_digest: String,
    ) -> FinalizedRecord {
        FinalizedRecord {
            task: task.to_string(),
            schema_version: schema.base.version,
            fields: arbitration.fields,
            primary_source_url: arbitration.primary_url,
            secondary_source_urls: arbitration.secondary_urls,
            confidence_score: arbitration.confidence,
            confidence_explanation: arbitration.explanation,
            arbitration: mode,
            evidence_digest,
            prompt_version: prompt_version_hash(),
            provenance_notes: Vec::new(),
        }
    }

    async fn invoke_model(&self, task: &str, schema: &FinalizedSchema, evidence: &str) -> Result<Value> {
        let system = format_finalizer_prompt(schema);
        let contract = finalized_contract(schema);
        let model = &*self.model;
        let (system, contract) = (&system, &contract);

        let response = with_retry(&self.config.retry, "Finalization", ModelError::is_transient, move |_, _| async move {
            model.generate_structured(system, evidence, contract).await
        })
        .await
        .map_err(|failure| AttributionError::Finalization {
            task: task.to_string(),
            reason: format!("model call failed after {} attempts: {}", failure.attempts, failure.error),
        })?;

        self.usage.record(response.usage);
        Ok(response.value)
    }

    /// Turn the finalizer's raw response into a record, repairing
    /// provenance that does not trace back to the input.
    fn validate_model_output(
        &self,
        task: &str,
        schema: &FinalizedSchema,
        candidates: &[CandidateRecord],
        value: &Value,
        fallback: Arbitration,
        evidence_digest: String,
    ) -> Result<FinalizedRecord> {
        let fail = |reason: String| AttributionError::Finalization {
            task: task.to_string(),
            reason,
        };

        let object = value
            .as_object()
            .ok_or_else(|| fail("finalizer response is not a JSON object".into()))?;
        let p = &schema.provenance;

        for name in p.names() {
            if !object.contains_key(name) {
                return Err(fail(format!("finalizer response is missing {name}")));
            }
        }

        let fields = coerce_fields(&schema.base, object).map_err(|e| fail(e.to_string()))?;
        let (confidence_score, rescaled) = parse_confidence(object.get(&p.confidence_score)).map_err(fail)?;

        let mut notes: Vec<String> = rescaled.into_iter().collect();
        let known = KnownUrls::new(candidates);

        let primary = match object.get(&p.primary_url).and_then(Value::as_str) {
            Some(raw) => match known.resolve(raw) {
                Some(url) => url.to_string(),
                None => {
                    warn!(task, url = raw, "Finalizer named an unknown primary URL, using fallback");
                    notes.push(format!("primary URL {raw} is not among the sources; replaced"));
                    fallback.primary_url.clone()
                }
            },
            None => {
                notes.push("primary URL missing; replaced".into());
                fallback.primary_url.clone()
            }
        };

        let mut secondary: Vec<String> = Vec::new();
        for raw in string_list(object.get(&p.secondary_urls)) {
            match known.resolve(&raw) {
                Some(url) if url == primary => {}
                Some(url) => {
                    if !secondary.iter().any(|s| s == url) {
                        secondary.push(url.to_string());
                    }
                }
                None => {
                    warn!(task, url = %raw, "Finalizer named an unknown secondary URL, dropping");
                    notes.push(format!("secondary URL {raw} is not among the sources; dropped"));
                }
            }
        }

        let explanation = object
            .get(&p.confidence_explanation)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        debug!(task, primary = %primary, secondaries = secondary.len(), confidence_score, "Finalized record validated");

        Ok(FinalizedRecord {
            task: task.to_string(),
            schema_version: schema.base.version,
            fields,
            primary_source_url: primary,
            secondary_source_urls: secondary,
            confidence_score,
            confidence_explanation: explanation,
            arbitration: ArbitrationMode::Model,
            evidence_digest,
            prompt_version: prompt_version_hash(),
            provenance_notes: notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockModel;
    use crate::types::config::RetryPolicy;
    use crate::types::record::FieldValue;
    use crate::types::schema::{AttributeSchema, FieldSpec};
    use crate::types::source::SourceTier;
    use serde_json::json;

    fn schema() -> FinalizedSchema {
        AttributeSchema::new("nutrition", "Nutrition")
            .field(FieldSpec::text("Product_Name_Scraped").identity())
            .field(FieldSpec::text("Calories"))
            .finalized()
    }

    fn candidate(url: &str, tier: SourceTier, is_match: bool, calories: Option<&str>) -> CandidateRecord {
        let mut record = CandidateRecord::no_evidence(&schema().base, url, tier);
        record.is_match = is_match;
        if let Some(c) = calories {
            record.fields.insert("Calories".into(), FieldValue::Text(c.into()));
        }
        record
    }

    fn reconciler(model: Arc<MockModel>) -> Reconciler<MockModel> {
        Reconciler::new(model, PipelineConfig::default().with_retry(RetryPolicy::immediate(2)))
    }

    fn candidates() -> Vec<CandidateRecord> {
        vec![
            candidate("https://a.example/item", SourceTier::TierOne, true, Some("200")),
            candidate("https://b.example/item", SourceTier::TierTwo, true, Some("210")),
        ]
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url(" https://A.example/item/#top "), "https://a.example/item");
        assert_eq!(normalize_url("not a url/"), "not a url");
    }

    #[test]
    fn test_parse_confidence() {
        assert_eq!(parse_confidence(Some(&json!(0.8))).unwrap().0, 0.8);
        assert_eq!(parse_confidence(Some(&json!(1))).unwrap(), (1.0, None));
        let (score, note) = parse_confidence(Some(&json!("85%"))).unwrap();
        assert!((score - 0.85).abs() < 1e-9);
        assert!(note.is_some());
        let (score, _) = parse_confidence(Some(&json!(85))).unwrap();
        assert!((score - 0.85).abs() < 1e-9);
        let (score, _) = parse_confidence(Some(&json!("0.5%"))).unwrap();
        assert!((score - 0.005).abs() < 1e-9);
        assert!(parse_confidence(Some(&json!(-0.2))).is_err());
        assert!(parse_confidence(Some(&json!(250))).is_err());
        assert!(parse_confidence(None).is_err());
    }

    #[test]
    fn test_confidence_just_over_one_is_rejected() {
        let err = parse_confidence(Some(&json!(1.5))).unwrap_err();
        assert!(err.contains("out of range"));
        assert!(parse_confidence(Some(&json!("1.9"))).is_err());
        assert!(parse_confidence(Some(&json!("150%"))).is_err());
    }

    #[tokio::test]
    async fn test_model_output_is_validated() {
        let model = Arc::new(MockModel::new().with_finalized(json!({
            "Product_Name_Scraped": "Patty",
            "Calories": "200",
            "Primary_Nutrition_URL": "https://a.example/item/",
            "Secondary_Nutrition_URLs": [
                "https://b.example/item",
                "https://a.example/item",
                "https://invented.example/page"
            ],
            "Confidence_Score_Nutrition": 0.9,
            "Confidence_Explanation_Nutrition": "tier one label"
        })));
        let record = reconciler(model.clone())
            .finalize("nutrition", &candidates(), &schema())
            .await
            .unwrap();

        assert_eq!(record.primary_source_url, "https://a.example/item");
        assert_eq!(record.secondary_source_urls, vec!["https://b.example/item".to_string()]);
        assert_eq!(record.value("Calories"), &FieldValue::Text("200".into()));
        assert_eq!(record.confidence_score, 0.9);
        assert_eq!(record.arbitration, ArbitrationMode::Model);
        assert_eq!(record.provenance_notes.len(), 1);
        assert!(record.provenance_notes[0].contains("invented.example"));
        assert_eq!(record.prompt_version, prompt_version_hash());
        assert_eq!(model.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_hallucinated_primary_replaced_by_fallback() {
        let model = Arc::new(MockModel::new().with_finalized(json!({
            "Calories": "210",
            "Primary_Nutrition_URL": "https://elsewhere.example",
            "Secondary_Nutrition_URLs": [],
            "Confidence_Score_Nutrition": 0.5,
            "Confidence_Explanation_Nutrition": ""
        })));
        let record = reconciler(model).finalize("nutrition", &candidates(), &schema()).await.unwrap();

        assert_eq!(record.primary_source_url, "https://a.example/item");
        assert!(!record.secondary_source_urls.contains(&record.primary_source_url));
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_finalization_error() {
        let model = Arc::new(MockModel::new().with_finalized(json!({
            "Calories": "200",
            "Primary_Nutrition_URL": "https://a.example/item",
            "Secondary_Nutrition_URLs": [],
            "Confidence_Score_Nutrition": 700,
            "Confidence_Explanation_Nutrition": "sure"
        })));
        let err = reconciler(model).finalize("nutrition", &candidates(), &schema()).await.unwrap_err();
        assert!(matches!(err, AttributionError::Finalization { .. }));
    }

    #[tokio::test]
    async fn test_missing_provenance_is_finalization_error() {
        let model = Arc::new(MockModel::new().with_finalized(json!({ "Calories": "200" })));
        let err = reconciler(model).finalize("nutrition", &candidates(), &schema()).await.unwrap_err();
        assert!(err.to_string().contains("Primary_Nutrition_URL"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_is_finalization_error() {
        let model = Arc::new(
            MockModel::new()
                .fail_next(ModelError::Timeout { seconds: 1 })
                .fail_next(ModelError::Timeout { seconds: 1 }),
        );
        let err = reconciler(model.clone()).finalize("nutrition", &candidates(), &schema()).await.unwrap_err();

        assert!(matches!(err, AttributionError::Finalization { .. }));
        assert_eq!(model.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_no_match_skips_model() {
        let model = Arc::new(MockModel::new());
        let none_match = vec![
            candidate("https://a.example", SourceTier::TierOne, false, Some("90")),
            candidate("https://b.example", SourceTier::TierTwo, false, None),
            candidate("https://c.example", SourceTier::TierTwo, false, None),
        ];
        let record = reconciler(model.clone()).finalize("nutrition", &none_match, &schema()).await.unwrap();

        assert!(record.confidence_score < 0.3);
        assert!(record.fields.values().all(|v| *v == FieldValue::Undetermined));
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_candidates_is_error() {
        let err = reconciler(Arc::new(MockModel::new()))
            .finalize("nutrition", &[], &schema())
            .await
            .unwrap_err();
        assert!(matches!(err, AttributionError::Finalization { .. }));
    }

    #[tokio::test]
    async fn test_deterministic_mode_is_idempotent() {
        let model = Arc::new(MockModel::new());
        let reconciler = Reconciler::new(
            model.clone(),
            PipelineConfig::default().with_arbitration(ArbitrationMode::Deterministic),
        );

        let first = reconciler.finalize("nutrition", &candidates(), &schema()).await.unwrap();
        let second = reconciler.finalize("nutrition", &candidates(), &schema()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.primary_source_url, "https://a.example/item");
        assert_eq!(first.value("Calories"), &FieldValue::Text("200".into()));
        assert!(model.calls().is_empty());
    }
}
