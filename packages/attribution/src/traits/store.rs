//! Retrieval and persistence collaborators.
//!
//! - `SourceProvider` - Supplies source documents per product and task
//! - `RecordSink` - Durable storage for product outcomes
//!
//! The pipeline does not know how sources were scraped or where outcomes
//! end up.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{outcome::ProductOutcome, source::ProductContext, source::SourceDocument};

/// Supplies the scraped evidence for a product.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Source documents for one task. An empty list is a valid answer.
    async fn sources(&self, product: &ProductContext, task: &str) -> Result<Vec<SourceDocument>>;
}

/// Accepts finished product outcomes.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist one product outcome.
    async fn persist(&self, outcome: &ProductOutcome) -> Result<()>;
}
