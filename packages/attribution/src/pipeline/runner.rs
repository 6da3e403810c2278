//! Pipeline driver.
//!
//! Sequences extraction, the gate and reconciliation for each task of each
//! product. Products run one after another and so do the sources within a
//! task; tasks of the same product are independent of each other.

use chrono::Utc;
use futures::FutureExt;
use indexmap::IndexMap;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::extract::Extractor;
use super::finalize::Reconciler;
use super::gate::{is_empty_result, is_fully_undetermined, screen};
use super::serving::screen_serving_size;
use super::state::{ProductRun, TaskRun, TaskState};
use crate::error::Result;
use crate::registry::SchemaRegistry;
use crate::traits::model::{ImageTranscriber, StructuredModel};
use crate::traits::store::{RecordSink, SourceProvider};
use crate::types::config::PipelineConfig;
use crate::types::outcome::{AbortReason, BatchSummary, ProductOutcome, TaskOutcome};
use crate::types::source::{ProductContext, SourceDocument};
use crate::types::usage::{TokenUsage, TokenUsageCounter};

/// Note set on a product whose tasks all came back empty.
pub const NO_DATA_NOTE: &str = "No data was found for this product";

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: unknown payload".to_string()
    }
}

/// The attribution pipeline.
pub struct Pipeline<M, T> {
    registry: SchemaRegistry,
    extractor: Extractor<M, T>,
    reconciler: Reconciler<M>,
    config: PipelineConfig,
    usage: Arc<TokenUsageCounter>,
}

impl<M: StructuredModel, T: ImageTranscriber> Pipeline<M, T> {
    pub fn new(registry: SchemaRegistry, model: Arc<M>, transcriber: Arc<T>, config: PipelineConfig) -> Self {
        let usage = Arc::new(TokenUsageCounter::new());
        let extractor =
            Extractor::new(model.clone(), transcriber, config.clone()).with_usage_counter(usage.clone());
        let reconciler = Reconciler::new(model, config.clone()).with_usage_counter(usage.clone());

        Self {
            registry,
            extractor,
            reconciler,
            config,
            usage,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Tokens spent by every model call this pipeline made.
    pub fn usage(&self) -> TokenUsage {
        self.usage.snapshot()
    }

    /// Run one task for one product.
    ///
    /// Aborts are returned as [`TaskOutcome::Aborted`]. Errors are an
    /// unknown task or a reconciliation that could not be completed; a
    /// source that fails extraction is skipped and recorded instead.
    pub async fn run_task(
        &self,
        product: &ProductContext,
        task: &str,
        sources: &[SourceDocument],
    ) -> Result<TaskOutcome> {
        let schema = self.registry.schema(task)?;
        let finalized_schema = self.registry.finalized(task)?;
        let mut run = TaskRun::new(schema.name.clone());

        if sources.is_empty() {
            info!(product = %product.id, task, "No sources for task");
            return run.abort(AbortReason::NoSources);
        }

        for doc in sources {
            match self.extractor.extract(schema, product, doc).await {
                Ok(candidate) => run.record_candidate(candidate),
                Err(e) if e.is_source_scoped() => {
                    warn!(product = %product.id, task, url = %doc.url, error = %e, "Skipping source");
                    run.record_skip(&doc.url, e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        if run.candidates.is_empty() {
            return run.abort(AbortReason::NoCandidates);
        }
        run.advance(TaskState::GateCheck)?;

        let screened = screen(schema, std::mem::take(&mut run.candidates), &self.config.gate);
        run.dropped = screened.dropped;
        let mut kept = screened.kept;

        if kept.is_empty() {
            info!(product = %product.id, task, dropped = run.dropped.len(), "Every candidate over threshold");
            return run.abort(AbortReason::AllCandidatesOverThreshold);
        }
        if let Some(margin_oz) = self.config.gate.serving_size_margin_oz {
            let checked = screen_serving_size(schema, product, kept, margin_oz);
            run.dropped.extend(checked.dropped);
            kept = checked.kept;
            if kept.is_empty() {
                info!(product = %product.id, task, "Every candidate failed serving size validation");
                return run.abort(AbortReason::ServingSizeMismatch);
            }
        }
        if self.config.gate.abort_if_fully_undetermined && kept.iter().all(|c| is_fully_undetermined(schema, c)) {
            return run.abort(AbortReason::AllCandidatesUndetermined);
        }
        run.advance(TaskState::Reconciling)?;

        let record = self.reconciler.finalize(&schema.name, &kept, &finalized_schema).await?;
        if self.config.gate.abort_if_empty_result && is_empty_result(schema, &record) {
            info!(product = %product.id, task, "Nothing survived reconciliation");
            return run.abort(AbortReason::EmptyAfterReconciliation);
        }

        info!(
            product = %product.id,
            task,
            candidates = kept.len(),
            primary = %record.primary_source_url,
            confidence = record.confidence_score,
            "Task finalized"
        );
        run.finish(record)
    }

    async fn task_outcome(&self, product: &ProductContext, task: &str, sources: &[SourceDocument]) -> TaskOutcome {
        match self.run_task(product, task, sources).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(product = %product.id, task, error = %e, "Task failed");
                TaskOutcome::Failed {
                    task: task.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Run several tasks for one product. A task missing from
    /// `sources_by_task` runs with no sources.
    pub async fn run_all_tasks<S: AsRef<str>>(
        &self,
        product: &ProductContext,
        tasks: &[S],
        sources_by_task: &IndexMap<String, Vec<SourceDocument>>,
    ) -> IndexMap<String, TaskOutcome> {
        let mut outcomes = IndexMap::new();
        for task in tasks {
            let task = task.as_ref();
            let sources = sources_by_task.get(task).map(Vec::as_slice).unwrap_or_default();
            let outcome = self.task_outcome(product, task, sources).await;
            outcomes.insert(task.to_string(), outcome);
        }
        outcomes
    }

    async fn drive<S: AsRef<str>>(
        &self,
        run: &mut ProductRun,
        tasks: &[S],
        provider: &dyn SourceProvider,
    ) -> Result<()> {
        for task in tasks {
            let task = task.as_ref();
            run.begin(task);
            let sources = provider.sources(&run.product, task).await?;
            let outcome = self.task_outcome(&run.product, task, &sources).await;
            run.complete(task, outcome);
        }
        Ok(())
    }

    /// Run every task for one product, fetching sources from `provider`.
    ///
    /// Never fails: a provider error or a panic is attached to the outcome
    /// under `error`, keeping whatever tasks completed before it.
    pub async fn run_product<S: AsRef<str>>(
        &self,
        product: &ProductContext,
        tasks: &[S],
        provider: &dyn SourceProvider,
    ) -> ProductOutcome {
        let started_at = Utc::now();
        let usage_before = self.usage.snapshot();
        let mut run = ProductRun::new(product.clone());

        info!(product = %product.id, run_id = %run.run_id, tasks = tasks.len(), "Processing product");

        let result = AssertUnwindSafe(self.drive(&mut run, tasks, provider))
            .catch_unwind()
            .await;
        let error = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(payload) => Some(panic_message(payload)),
        };
        if let Some(e) = &error {
            error!(product = %product.id, task = ?run.current_task, error = %e, "Product failed");
        }

        let finalized = run.finalized().count();
        let note = (finalized == 0).then(|| NO_DATA_NOTE.to_string());

        ProductOutcome {
            run_id: run.run_id,
            product: run.product,
            tasks: run.outcomes,
            error,
            note,
            usage: self.usage.snapshot().since(&usage_before),
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Run a batch of products sequentially, persisting each outcome as
    /// soon as it is ready.
    pub async fn run_batch<S: AsRef<str>>(
        &self,
        products: &[ProductContext],
        tasks: &[S],
        provider: &dyn SourceProvider,
        sink: &dyn RecordSink,
    ) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        for (index, product) in products.iter().enumerate() {
            let outcome = self.run_product(product, tasks, provider).await;
            sink.persist(&outcome).await?;
            summary.record(&outcome);
            info!(
                progress = format!("{}/{}", index + 1, products.len()),
                product = %product.id,
                finalized = outcome.finalized_count(),
                "Product done"
            );
        }
        info!(
            products = summary.products,
            finalized = summary.finalized_tasks,
            aborted = summary.aborted_tasks,
            failed = summary.failed_tasks,
            total_tokens = summary.usage.total_tokens,
            "Batch complete"
        );
        Ok(summary)
    }
}
