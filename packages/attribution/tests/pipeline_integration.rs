//! Integration tests for the attribution pipeline.
//!
//! These tests drive the full per-task workflow through the public API:
//! 1. Extract one candidate per source
//! 2. Screen candidates with the undetermined-rate gate
//! 3. Reconcile survivors into a finalized record
//! 4. Collect task outcomes per product and persist them

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

use product_attribution::{
    pipeline::{arbitrate, Reconciler},
    registry::builtin,
    testing::{MockModel, MockTranscriber},
    AbortReason, ArbitrationMode, AttributeSchema, AttributionError, CandidateRecord, FieldSpec,
    FieldValue, GatePolicy, JsonlSink, MemorySink, ModelError, Pipeline, PipelineConfig,
    ProductContext, ProductOutcome, Result, RetryPolicy, SchemaRegistry, SourceDocument,
    SourceProvider, SourceTier, StaticSourceProvider, TaskOutcome,
};

const URL_A: &str = "https://acme.example/angus-patty";
const URL_B: &str = "https://grocer.example/p/123";

/// Helper: a small nutrition schema with four gate fields.
fn nutrition() -> AttributeSchema {
    AttributeSchema::new("nutrition", "Nutrition")
        .field(FieldSpec::text("Product_Name_Scraped").identity())
        .field(FieldSpec::text("Calories"))
        .field(FieldSpec::text("Protein"))
        .field(FieldSpec::text("Total_Fat"))
        .field(FieldSpec::text("Sodium"))
}

fn registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_schema(nutrition())
        .with_schema(builtin::ingredients())
}

fn config(mode: ArbitrationMode) -> PipelineConfig {
    PipelineConfig::default()
        .with_retry(RetryPolicy::immediate(2))
        .with_arbitration(mode)
}

/// Helper to set up a pipeline over a mock model.
fn setup(model: MockModel, config: PipelineConfig) -> (Pipeline<MockModel, MockTranscriber>, Arc<MockModel>) {
    let model = Arc::new(model);
    let pipeline = Pipeline::new(registry(), model.clone(), Arc::new(MockTranscriber::new()), config);
    (pipeline, model)
}

fn product() -> ProductContext {
    ProductContext::new("sku-1", "Angus Beef Patty")
        .with_manufacturer("Acme")
        .with_size("4 oz")
}

fn sources() -> Vec<SourceDocument> {
    vec![
        SourceDocument::text(URL_A, SourceTier::TierOne, "Calories 200. Protein 20g."),
        SourceDocument::html(URL_B, SourceTier::TierTwo, "<p>Calories: 210</p><p>Protein 20g</p>"),
    ]
}

fn disagreeing_model() -> MockModel {
    MockModel::new()
        .with_candidate(URL_A, json!({ "is_match": true, "Calories": "200", "Protein": "20g" }))
        .with_candidate(URL_B, json!({ "is_match": true, "Calories": "210", "Protein": "20g" }))
}

fn finalized(outcome: &TaskOutcome) -> &product_attribution::FinalizedRecord {
    outcome
        .record()
        .unwrap_or_else(|| panic!("expected a finalized record, got {outcome:?}"))
}

#[tokio::test]
async fn test_higher_tier_breaks_tie_end_to_end() {
    let (pipeline, _) = setup(disagreeing_model(), config(ArbitrationMode::Deterministic));

    let outcome = pipeline.run_task(&product(), "nutrition", &sources()).await.unwrap();
    let record = finalized(&outcome);

    assert_eq!(record.primary_source_url, URL_A);
    assert_eq!(record.value("Calories"), &FieldValue::Text("200".into()));
    assert_eq!(record.secondary_source_urls, vec![URL_B.to_string()]);
    assert!(record.confidence_score > 0.0 && record.confidence_score <= 1.0);
}

#[tokio::test]
async fn test_model_arbitration_is_validated() {
    let model = disagreeing_model().with_finalized(json!({
        "Product_Name_Scraped": "Angus Beef Patty",
        "Calories": "200",
        "Protein": "20g",
        "Total_Fat": "undetermined",
        "Sodium": "undetermined",
        "Primary_Nutrition_URL": URL_A,
        "Secondary_Nutrition_URLs": [URL_B, "https://made-up.example/x", URL_A],
        "Confidence_Score_Nutrition": 0.8,
        "Confidence_Explanation_Nutrition": "Manufacturer page agrees with retailer on protein."
    }));
    let (pipeline, model) = setup(model, config(ArbitrationMode::Model));

    let outcome = pipeline.run_task(&product(), "nutrition", &sources()).await.unwrap();
    let record = finalized(&outcome);

    assert_eq!(record.primary_source_url, URL_A);
    assert_eq!(record.secondary_source_urls, vec![URL_B.to_string()]);
    assert_eq!(record.arbitration, ArbitrationMode::Model);
    assert!(record.provenance_notes.iter().any(|n| n.contains("made-up.example")));

    let finalization = model.finalization_calls();
    assert_eq!(finalization.len(), 1);
    assert!(finalization[0].user.contains(URL_A));
    assert!(finalization[0].user.contains(URL_B));
}

#[tokio::test]
async fn test_fully_undetermined_candidates_never_reach_reconciler() {
    let model = MockModel::new().with_default(json!({ "is_match": true }));
    let (pipeline, model) = setup(model, config(ArbitrationMode::Model));

    let outcome = pipeline.run_task(&product(), "nutrition", &sources()).await.unwrap();

    let aborted = outcome.aborted().expect("aborted outcome");
    assert_eq!(aborted.reason, AbortReason::AllCandidatesOverThreshold);
    assert_eq!(aborted.dropped_candidates.len(), 2);
    assert!(aborted.diagnostic.contains("nutrition"));
    assert!(model.finalization_calls().is_empty());
    assert_eq!(model.calls().len(), 2);
}

#[tokio::test]
async fn test_fully_undetermined_abort_without_threshold_drop() {
    let model = MockModel::new().with_default(json!({ "is_match": true }));
    let gate = GatePolicy {
        abort_if_fully_undetermined: true,
        ..GatePolicy::permissive()
    };
    let (pipeline, model) = setup(model, config(ArbitrationMode::Model).with_gate(gate));

    let outcome = pipeline.run_task(&product(), "nutrition", &sources()).await.unwrap();

    assert_eq!(outcome.aborted().unwrap().reason, AbortReason::AllCandidatesUndetermined);
    assert!(model.finalization_calls().is_empty());
}

#[tokio::test]
async fn test_gate_threshold_is_inclusive() {
    // one of four gate fields resolved: exactly 75% undetermined
    let model = MockModel::new().with_default(json!({ "is_match": true, "Calories": "200" }));
    let (pipeline, _) = setup(model, config(ArbitrationMode::Deterministic));
    let sources = vec![SourceDocument::text(URL_A, SourceTier::TierOne, "Calories 200")];

    let outcome = pipeline.run_task(&product(), "nutrition", &sources).await.unwrap();
    assert_eq!(outcome.aborted().unwrap().reason, AbortReason::AllCandidatesOverThreshold);

    let gate = GatePolicy::default().with_max_undetermined_rate(0.76);
    let model = MockModel::new().with_default(json!({ "is_match": true, "Calories": "200" }));
    let (pipeline, _) = setup(model, config(ArbitrationMode::Deterministic).with_gate(gate));

    let outcome = pipeline.run_task(&product(), "nutrition", &sources).await.unwrap();
    assert!(outcome.is_finalized());
}

#[tokio::test]
async fn test_no_matching_source_yields_low_confidence() {
    // every source is about some other product
    let gate = GatePolicy::permissive();
    let (pipeline, model) = setup(MockModel::new(), config(ArbitrationMode::Model).with_gate(gate));
    let sources = vec![
        SourceDocument::text("https://a.example", SourceTier::TierOne, "Turkey burger"),
        SourceDocument::text("https://b.example", SourceTier::TierTwo, "Veggie burger"),
        SourceDocument::text("https://c.example", SourceTier::TierTwo, "Chicken patty"),
    ];

    let outcome = pipeline.run_task(&product(), "nutrition", &sources).await.unwrap();
    let record = finalized(&outcome);

    assert!(record.confidence_score < 0.3);
    assert!(record.fields.values().all(|v| *v == FieldValue::Undetermined));
    assert!(model.finalization_calls().is_empty());
}

#[tokio::test]
async fn test_empty_after_reconciliation_aborts() {
    // candidates survive the gate but none matches the product
    let model = MockModel::new().with_default(json!({ "is_match": false, "Calories": "90", "Protein": "1g" }));
    let (pipeline, _) = setup(model, config(ArbitrationMode::Deterministic));

    let outcome = pipeline.run_task(&product(), "nutrition", &sources()).await.unwrap();

    let aborted = outcome.aborted().unwrap();
    assert_eq!(aborted.reason, AbortReason::EmptyAfterReconciliation);
    assert_eq!(
        aborted.diagnostic,
        "No data made it through past final validation for task: nutrition"
    );
}

#[tokio::test]
async fn test_unvalidatable_finalizer_output_fails_task() {
    let model = disagreeing_model().with_finalized(json!({
        "Calories": "200",
        "Primary_Nutrition_URL": URL_A,
        "Secondary_Nutrition_URLs": [],
        "Confidence_Score_Nutrition": 4000,
        "Confidence_Explanation_Nutrition": "very sure"
    }));
    let (pipeline, _) = setup(model, config(ArbitrationMode::Model));

    let err = pipeline.run_task(&product(), "nutrition", &sources()).await.unwrap_err();
    assert!(matches!(err, AttributionError::Finalization { .. }));

    let by_task = indexmap::IndexMap::from([("nutrition".to_string(), sources())]);
    let outcomes = pipeline.run_all_tasks(&product(), &["nutrition"], &by_task).await;
    assert!(outcomes["nutrition"].is_failed());
}

#[tokio::test]
async fn test_sibling_tasks_are_independent() {
    let model = disagreeing_model().with_candidate(
        "https://acme.example/ingredients",
        json!({ "is_match": true, "Ingredients": ["Beef", "Salt"] }),
    );
    let (pipeline, _) = setup(model, config(ArbitrationMode::Deterministic));

    let mut by_task = indexmap::IndexMap::new();
    by_task.insert(
        "ingredients".to_string(),
        vec![SourceDocument::text(
            "https://acme.example/ingredients",
            SourceTier::TierOne,
            "Ingredients: beef, salt",
        )],
    );

    let outcomes = pipeline
        .run_all_tasks(&product(), &["nutrition", "ingredients", "shrimp"], &by_task)
        .await;

    assert_eq!(outcomes["nutrition"].aborted().unwrap().reason, AbortReason::NoSources);
    assert_eq!(
        finalized(&outcomes["ingredients"]).value("Ingredients"),
        &FieldValue::List(vec!["Beef".into(), "Salt".into()])
    );
    // not registered in this pipeline
    assert!(outcomes["shrimp"].is_failed());
}

#[tokio::test]
async fn test_finalize_is_idempotent_with_stubbed_model() {
    let model = Arc::new(MockModel::new().with_finalized(json!({
        "Calories": "200",
        "Protein": "20g",
        "Primary_Nutrition_URL": URL_A,
        "Secondary_Nutrition_URLs": [URL_B],
        "Confidence_Score_Nutrition": 0.75,
        "Confidence_Explanation_Nutrition": "agreement on protein"
    })));
    let reconciler = Reconciler::new(model, config(ArbitrationMode::Model));
    let schema = nutrition().finalized();

    let mut a = CandidateRecord::no_evidence(&schema.base, URL_A, SourceTier::TierOne);
    a.is_match = true;
    a.fields.insert("Calories".into(), FieldValue::Text("200".into()));
    let mut b = CandidateRecord::no_evidence(&schema.base, URL_B, SourceTier::TierTwo);
    b.is_match = true;
    b.fields.insert("Calories".into(), FieldValue::Text("210".into()));
    let candidates = vec![a, b];

    let first = reconciler.finalize("nutrition", &candidates, &schema).await.unwrap();
    let second = reconciler.finalize("nutrition", &candidates, &schema).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

struct FlakyProvider {
    inner: StaticSourceProvider,
}

#[async_trait]
impl SourceProvider for FlakyProvider {
    async fn sources(&self, product: &ProductContext, task: &str) -> Result<Vec<SourceDocument>> {
        if product.id == "broken" {
            return Err(AttributionError::Storage("bucket unavailable".into()));
        }
        self.inner.sources(product, task).await
    }
}

#[tokio::test]
async fn test_batch_captures_product_errors_and_continues() {
    let model = disagreeing_model().panic_on_url("https://crash.example");
    let (pipeline, _) = setup(model, config(ArbitrationMode::Deterministic));

    let provider = FlakyProvider {
        inner: StaticSourceProvider::new()
            .with_shared_sources("sku-1", sources())
            .with_shared_sources(
                "crashy",
                vec![SourceDocument::text("https://crash.example", SourceTier::TierOne, "boom")],
            ),
    };
    let products = vec![
        ProductContext::new("broken", "Unreachable"),
        ProductContext::new("crashy", "Panics"),
        product(),
        ProductContext::new("empty", "Nothing scraped"),
    ];
    let sink = MemorySink::new();

    let summary = pipeline
        .run_batch(&products, &["nutrition"], &provider, &sink)
        .await
        .unwrap();

    assert_eq!(summary.products, 4);
    assert_eq!(summary.product_errors, 2);
    assert_eq!(summary.finalized_tasks, 1);

    let outcomes: Vec<ProductOutcome> = sink.outcomes();
    assert!(outcomes[0].error.as_deref().unwrap().contains("bucket unavailable"));
    assert!(outcomes[1].error.as_deref().unwrap().contains("panic"));
    assert!(outcomes[2].error.is_none());
    assert_eq!(outcomes[2].finalized_count(), 1);
    assert_eq!(outcomes[3].note.as_deref(), Some("No data was found for this product"));
    assert!(outcomes[3].tasks["nutrition"].is_aborted());
}

#[tokio::test]
async fn test_batch_to_jsonl() {
    let model = disagreeing_model().with_usage(product_attribution::TokenUsage::new(50, 5));
    let (pipeline, _) = setup(model, config(ArbitrationMode::Deterministic));
    let provider = StaticSourceProvider::new().with_shared_sources("sku-1", sources());

    let path = std::env::temp_dir().join(format!("attribution-batch-{}.jsonl", uuid::Uuid::new_v4()));
    let sink = JsonlSink::create(&path).await.unwrap();

    let summary = pipeline
        .run_batch(&[product()], &["nutrition", "ingredients"], &provider, &sink)
        .await
        .unwrap();
    assert_eq!(summary.usage.total_tokens, 4 * 55);

    let text = tokio::fs::read_to_string(&path).await.unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1);

    let outcome: ProductOutcome = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(outcome.tasks["nutrition"].record().unwrap().primary_source_url, URL_A);
    assert_eq!(outcome.usage.total_tokens, 4 * 55);

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn test_transient_failure_is_retried_not_skipped() {
    let model = disagreeing_model().fail_next(ModelError::Transient("502".into()));
    let (pipeline, model) = setup(model, config(ArbitrationMode::Deterministic));

    let outcome = pipeline.run_task(&product(), "nutrition", &sources()).await.unwrap();

    match outcome {
        TaskOutcome::Finalized { skipped_sources, .. } => assert!(skipped_sources.is_empty()),
        other => panic!("expected finalized, got {other:?}"),
    }
    assert_eq!(model.calls().len(), 3);
}

fn arb_candidates() -> impl Strategy<Value = Vec<CandidateRecord>> {
    let schema = nutrition();
    proptest::collection::vec(
        (0..4usize, any::<bool>(), any::<bool>(), proptest::option::of(0..3u8)),
        1..6,
    )
    .prop_map(move |rows| {
        rows.into_iter()
            .map(|(host, tier_one, is_match, calories)| {
                let tier = if tier_one { SourceTier::TierOne } else { SourceTier::TierTwo };
                let mut record = CandidateRecord::no_evidence(&schema, format!("https://s{host}.example"), tier);
                record.is_match = is_match;
                if let Some(c) = calories {
                    record.fields.insert("Calories".into(), FieldValue::Text(format!("{}", 200 + c)));
                }
                record
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_primary_is_an_input_url_and_not_secondary(candidates in arb_candidates()) {
        let result = arbitrate(&nutrition(), &candidates, 0.1).unwrap();

        prop_assert!(candidates.iter().any(|c| c.url == result.primary_url));
        prop_assert!(!result.secondary_urls.contains(&result.primary_url));
        for url in &result.secondary_urls {
            prop_assert!(candidates.iter().any(|c| &c.url == url));
        }
        prop_assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[test]
    fn prop_no_match_is_low_confidence(candidates in arb_candidates()) {
        let none_match: Vec<CandidateRecord> = candidates
            .into_iter()
            .map(|mut c| { c.is_match = false; c })
            .collect();
        let result = arbitrate(&nutrition(), &none_match, 0.1).unwrap();

        prop_assert!(result.confidence < 0.3);
        prop_assert!(result.fields.values().all(|v| *v == FieldValue::Undetermined));
    }
}
