//! Attribution pipeline - the core of the library.
//!
//! The pipeline orchestrates, per product and task:
//! - Extraction (one structured-output call per source document)
//! - The undetermined-rate gate and serving size validation
//! - Reconciliation into one finalized record with provenance
//!
//! Each task moves through the [`state::TaskState`] machine; an abort ends
//! that task only.

pub mod arbitrate;
pub mod coerce;
pub mod contract;
pub mod extract;
pub mod finalize;
pub mod gate;
pub mod html;
pub mod prompts;
pub mod retry;
pub mod runner;
pub mod serving;
pub mod state;

pub use arbitrate::{arbitrate, fallback_primary, Arbitration};
pub use coerce::{coerce_candidate, coerce_fields, coerce_value, validate, Violation};
pub use contract::{candidate_contract, finalized_contract};
pub use extract::{estimate_tokens, truncate_to_budget, Extractor, Transcription};
pub use finalize::Reconciler;
pub use gate::{diagnostic, is_empty_result, is_fully_undetermined, is_over_threshold, screen, undetermined_rate, Screened};
pub use html::clean_html;
pub use prompts::{
    digest, format_document_prompt, format_evidence, format_finalizer_prompt, format_parser_prompt,
    prompt_version_hash, FINALIZER_PROMPT, PARSER_PROMPT, TRANSCRIBE_PROMPT,
};
pub use retry::{with_retry, RetryFailure};
pub use runner::{Pipeline, NO_DATA_NOTE};
pub use serving::{check_serving_size, screen_serving_size, serving_size_mismatch, Quantity, ServingSizeCheck, Unit};
pub use state::{ProductRun, TaskRun, TaskState};
