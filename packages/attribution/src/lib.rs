//! Multi-Source Product Attribution Library
//!
//! Reads scraped evidence about a product (manufacturer feeds, retailer
//! pages, label photos) and produces one finalized, provenance-annotated
//! record per product per task.
//!
//! # Design Philosophy
//!
//! - Schema-driven: every model call is constrained by an output contract
//! - Evidence is never fabricated: "undetermined" beats a guess
//! - Sparse evidence aborts a task early instead of paying for reconciliation
//! - Per-source failures degrade evidence; they never fail the batch
//!
//! # Usage
//!
//! ```rust,ignore
//! use product_attribution::{Pipeline, PipelineConfig, SchemaRegistry, SourceDocument, SourceTier};
//! use product_attribution::testing::{MockModel, MockTranscriber};
//!
//! let pipeline = Pipeline::new(
//!     SchemaRegistry::builtin(),
//!     Arc::new(MockModel::new()),
//!     Arc::new(MockTranscriber::new()),
//!     PipelineConfig::default(),
//! );
//!
//! let sources = vec![SourceDocument::html(url, SourceTier::TierOne, html)];
//! let outcome = pipeline.run_task(&product, "nutrition", &sources).await?;
//! ```
//!
//! # Modules
//!
//! - [`registry`] - Task and category schemas
//! - [`pipeline`] - Extraction, gate, reconciliation and the state machine
//! - [`traits`] - Model, source provider and sink abstractions
//! - [`types`] - Schemas, records, outcomes and configuration
//! - [`stores`] - Source provider and sink implementations
//! - [`security`] - Credential handling
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod pipeline;
pub mod registry;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core types at crate root
pub use error::{AttributionError, ModelError, Result};
pub use registry::SchemaRegistry;
pub use traits::{
    model::{ImageTranscriber, ModelResponse, NoTranscriber, ResponseSchema, StructuredModel, Transcript},
    store::{RecordSink, SourceProvider},
};
pub use types::{
    config::{ArbitrationMode, GatePolicy, PipelineConfig, RetryPolicy},
    outcome::{
        AbortReason, AbortedResult, BatchSummary, DroppedCandidate, ProductOutcome, SkippedSource,
        TaskOutcome,
    },
    record::{CandidateRecord, FieldValue, FinalizedRecord, UNDETERMINED},
    schema::{AttributeSchema, FieldSpec, FieldType, FinalizedSchema, ProvenanceFields},
    source::{
        ContentKind, ProductContext, RetrievedSource, RetrievedSources, SourceContent, SourceDocument,
        SourceMetadata, SourceTier,
    },
    usage::{TokenUsage, TokenUsageCounter},
};

// Re-export pipeline components
pub use pipeline::{
    // Stages
    Extractor, Pipeline, Reconciler,
    // Gate
    is_empty_result, is_over_threshold, undetermined_rate,
    // State machine
    TaskRun, TaskState,
};

// Re-export stores
pub use stores::{JsonlSink, MemorySink, StaticSourceProvider};

// Re-export testing utilities
pub use testing::{MockModel, MockTranscriber};

#[cfg(feature = "openai")]
pub use ai::OpenAIModel;
