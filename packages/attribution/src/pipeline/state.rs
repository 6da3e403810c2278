//! Per-task state machine and per-product run state.
//!
//! ```text
//! Extracting -> GateCheck -> Reconciling -> Done
//!      \            \             \
//!       +------------+-------------+--> Aborted
//! ```
//!
//! `Aborted` is absorbing for the task it belongs to; sibling tasks keep
//! their own [`TaskRun`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AttributionError, Result};
use crate::types::outcome::{AbortReason, AbortedResult, DroppedCandidate, SkippedSource, TaskOutcome};
use crate::types::record::{CandidateRecord, FinalizedRecord};
use crate::types::source::ProductContext;

/// Stage a task is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Extracting,
    GateCheck,
    Reconciling,
    Done,
    Aborted,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    /// Legal moves. Any non-terminal state may abort.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Extracting, GateCheck) | (GateCheck, Reconciling) | (Reconciling, Done)
        ) || (!self.is_terminal() && next == Aborted)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extracting => "extracting",
            Self::GateCheck => "gate_check",
            Self::Reconciling => "reconciling",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Working state of one task for one product.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub task: String,
    state: TaskState,
    pub candidates: Vec<CandidateRecord>,
    pub skipped: Vec<SkippedSource>,
    pub dropped: Vec<DroppedCandidate>,
    abort: Option<AbortedResult>,
}

impl TaskRun {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            state: TaskState::Extracting,
            candidates: Vec::new(),
            skipped: Vec::new(),
            dropped: Vec::new(),
            abort: None,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn advance(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(AttributionError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(task = %self.task, from = %self.state, to = %next, "Task transition");
        self.state = next;
        Ok(())
    }

    pub fn record_candidate(&mut self, candidate: CandidateRecord) {
        self.candidates.push(candidate);
    }

    pub fn record_skip(&mut self, url: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedSource {
            url: url.into(),
            reason: reason.into(),
        });
    }

    /// Move to `Aborted`, keeping what was gathered so far.
    pub fn abort(&mut self, reason: AbortReason) -> Result<TaskOutcome> {
        self.advance(TaskState::Aborted)?;
        let result = AbortedResult {
            task: self.task.clone(),
            reason,
            diagnostic: reason.diagnostic(&self.task),
            skipped_sources: self.skipped.clone(),
            dropped_candidates: self.dropped.clone(),
        };
        self.abort = Some(result.clone());
        Ok(TaskOutcome::Aborted(result))
    }

    /// Move to `Done` with the reconciled record.
    pub fn finish(&mut self, record: FinalizedRecord) -> Result<TaskOutcome> {
        self.advance(TaskState::Done)?;
        Ok(TaskOutcome::Finalized {
            record,
            skipped_sources: std::mem::take(&mut self.skipped),
            dropped_candidates: std::mem::take(&mut self.dropped),
        })
    }

    pub fn aborted(&self) -> Option<&AbortedResult> {
        self.abort.as_ref()
    }
}

/// Working state for one product across all its tasks. Lives for one
/// product run and is consumed into a
/// [`ProductOutcome`](crate::types::outcome::ProductOutcome).
#[derive(Debug, Clone)]
pub struct ProductRun {
    pub run_id: Uuid,
    pub product: ProductContext,
    pub current_task: Option<String>,
    pub outcomes: IndexMap<String, TaskOutcome>,
}

impl ProductRun {
    pub fn new(product: ProductContext) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            product,
            current_task: None,
            outcomes: IndexMap::new(),
        }
    }

    pub fn begin(&mut self, task: &str) {
        self.current_task = Some(task.to_string());
    }

    pub fn complete(&mut self, task: &str, outcome: TaskOutcome) {
        self.current_task = None;
        self.outcomes.insert(task.to_string(), outcome);
    }

    pub fn finalized(&self) -> impl Iterator<Item = &FinalizedRecord> {
        self.outcomes.values().filter_map(TaskOutcome::record)
    }
}
