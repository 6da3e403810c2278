//! Task, product and batch outcomes.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::FinalizedRecord;
use super::source::ProductContext;
use super::usage::TokenUsage;

/// Why a task was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// No source documents were supplied for the task
    NoSources,

    /// Every source was skipped during extraction
    NoCandidates,

    /// Every candidate was over the undetermined-rate threshold
    AllCandidatesOverThreshold,

    /// Surviving candidates carried no resolved gate field
    AllCandidatesUndetermined,

    /// Every surviving candidate described a serving size that does not
    /// match the product's size
    ServingSizeMismatch,

    /// Reconciliation produced a record with nothing resolved
    EmptyAfterReconciliation,
}

impl AbortReason {
    /// Human-readable diagnostic written onto the aborted result.
    pub fn diagnostic(&self, task: &str) -> String {
        match self {
            Self::NoSources => format!("No data was found for this product for task: {task}"),
            Self::NoCandidates => {
                format!("Every source failed extraction for task: {task}")
            }
            Self::AllCandidatesOverThreshold | Self::AllCandidatesUndetermined => {
                format!("No data made it through past the undetermined-rate gate for task: {task}")
            }
            Self::ServingSizeMismatch => {
                format!("No data made it through past serving size validation for task: {task}")
            }
            Self::EmptyAfterReconciliation => {
                format!("No data made it through past final validation for task: {task}")
            }
        }
    }
}

/// A source that produced no candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSource {
    pub url: String,
    pub reason: String,
}

/// A candidate removed by the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedCandidate {
    pub url: String,
    pub undetermined_rate: f64,
    #[serde(default)]
    pub reason: String,
}

/// A task that ended before producing a finalized record. This is a normal
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortedResult {
    pub task: String,
    pub reason: AbortReason,
    pub diagnostic: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_sources: Vec<SkippedSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_candidates: Vec<DroppedCandidate>,
}

/// Result of running one task for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Finalized {
        record: FinalizedRecord,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        skipped_sources: Vec<SkippedSource>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        dropped_candidates: Vec<DroppedCandidate>,
    },
    Aborted(AbortedResult),
    Failed {
        task: String,
        error: String,
    },
}

impl TaskOutcome {
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn record(&self) -> Option<&FinalizedRecord> {
        match self {
            Self::Finalized { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn aborted(&self) -> Option<&AbortedResult> {
        match self {
            Self::Aborted(result) => Some(result),
            _ => None,
        }
    }
}

/// Everything produced for one product across its tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductOutcome {
    pub run_id: Uuid,
    pub product: ProductContext,
    pub tasks: IndexMap<String, TaskOutcome>,

    /// Unexpected failure caught at product level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Set when no task produced a finalized record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    pub usage: TokenUsage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ProductOutcome {
    pub fn finalized_count(&self) -> usize {
        self.tasks.values().filter(|t| t.is_finalized()).count()
    }
}

/// Counts for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub products: usize,
    pub finalized_tasks: usize,
    pub aborted_tasks: usize,
    pub failed_tasks: usize,
    pub product_errors: usize,
    pub usage: TokenUsage,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &ProductOutcome) {
        self.products += 1;
        for task in outcome.tasks.values() {
            match task {
                TaskOutcome::Finalized { .. } => self.finalized_tasks += 1,
                TaskOutcome::Aborted(_) => self.aborted_tasks += 1,
                TaskOutcome::Failed { .. } => self.failed_tasks += 1,
            }
        }
        if outcome.error.is_some() {
            self.product_errors += 1;
        }
        self.usage += outcome.usage;
    }
}
