//! Typed errors for the attribution library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Binaries wrap these in
//! `anyhow` at the edge.

use thiserror::Error;

/// Errors that can occur while running the attribution pipeline.
#[derive(Debug, Error)]
pub enum AttributionError {
    /// Task or product category is not registered
    #[error("unknown task or category: {name}")]
    UnknownTask { name: String },

    /// Model invocation for a single source exhausted its retries
    #[error("extraction for {url} failed after {attempts} attempts: {source}")]
    ExtractionTimeout {
        url: String,
        attempts: u32,
        #[source]
        source: ModelError,
    },

    /// Reconciliation failed or produced output that could not be validated
    #[error("finalization failed for task {task}: {reason}")]
    Finalization { task: String, reason: String },

    /// Source document could not be decoded
    #[error("invalid source {url}: {reason}")]
    InvalidSource { url: String, reason: String },

    /// Model output that could not be coerced into the schema
    #[error("malformed model output for {field}: {reason}")]
    MalformedOutput { field: String, reason: String },

    /// Pipeline state machine was asked for an illegal transition
    #[error("invalid pipeline transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Model invocation failed without being retried
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

impl AttributionError {
    /// Errors scoped to a single source. The pipeline records these as
    /// skipped sources instead of failing the task.
    pub fn is_source_scoped(&self) -> bool {
        matches!(
            self,
            Self::ExtractionTimeout { .. }
                | Self::InvalidSource { .. }
                | Self::MalformedOutput { .. }
                | Self::Model(_)
        )
    }
}

/// Errors reported by a model-invocation backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    /// The call did not complete within its timeout
    #[error("model call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Rate limits, dropped connections, 5xx responses
    #[error("transient model failure: {0}")]
    Transient(String),

    /// The prompt did not fit the model context window
    #[error("prompt exceeds model context: {0}")]
    ContextLength(String),

    /// The model declined to answer
    #[error("model refused: {0}")]
    Refusal(String),

    /// The response was not valid JSON for the requested contract
    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    /// Anything else (auth, bad request, missing backend)
    #[error("model failure: {0}")]
    Fatal(String),
}

impl ModelError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transient(_))
    }
}

/// Result type alias for attribution operations.
pub type Result<T> = std::result::Result<T, AttributionError>;
