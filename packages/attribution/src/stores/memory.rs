//! In-memory source provider and sink for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::warn;

use crate::error::Result;
use crate::traits::store::{RecordSink, SourceProvider};
use crate::types::outcome::ProductOutcome;
use crate::types::source::{ProductContext, RetrievedSources, SourceContent, SourceDocument};

/// Serves pre-loaded source documents.
///
/// Documents registered for a (product, task) pair win over documents
/// shared by every task of the product.
#[derive(Default)]
pub struct StaticSourceProvider {
    by_task: RwLock<HashMap<(String, String), Vec<SourceDocument>>>,
    shared: RwLock<HashMap<String, Vec<SourceDocument>>>,
}

impl StaticSourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources for one task of one product.
    pub fn with_sources(self, product_id: impl Into<String>, task: impl Into<String>, docs: Vec<SourceDocument>) -> Self {
        self.by_task
            .write()
            .unwrap()
            .insert((product_id.into(), task.into().to_lowercase()), docs);
        self
    }

    /// Sources used by every task of a product without its own.
    pub fn with_shared_sources(self, product_id: impl Into<String>, docs: Vec<SourceDocument>) -> Self {
        self.shared.write().unwrap().insert(product_id.into(), docs);
        self
    }

    /// Shared sources from a retrieval mapping. A source that fails to
    /// decode is kept as unreadable and reported as a skipped source when
    /// a task runs.
    pub fn with_retrieved(self, product_id: impl Into<String>, sources: RetrievedSources) -> Self {
        let product_id = product_id.into();
        let docs: Vec<SourceDocument> = sources
            .into_iter()
            .map(|(url, source)| source.into_document_or_unreadable(url))
            .collect();
        let unreadable = docs
            .iter()
            .filter(|d| matches!(d.content, SourceContent::Unreadable { .. }))
            .count();
        if unreadable > 0 {
            warn!(product = %product_id, unreadable, "Retrieved sources failed to decode");
        }
        self.with_shared_sources(product_id, docs)
    }

    /// Get the number of products with any sources.
    pub fn product_count(&self) -> usize {
        let mut ids: Vec<String> = self.shared.read().unwrap().keys().cloned().collect();
        ids.extend(self.by_task.read().unwrap().keys().map(|(id, _)| id.clone()));
        ids.sort();
        ids.dedup();
        ids.len()
    }
}

#[async_trait]
impl SourceProvider for StaticSourceProvider {
    async fn sources(&self, product: &ProductContext, task: &str) -> Result<Vec<SourceDocument>> {
        let key = (product.id.clone(), task.to_lowercase());
        if let Some(docs) = self.by_task.read().unwrap().get(&key) {
            return Ok(docs.clone());
        }
        Ok(self
            .shared
            .read()
            .unwrap()
            .get(&product.id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Keeps every persisted outcome in memory.
#[derive(Default)]
pub struct MemorySink {
    outcomes: RwLock<Vec<ProductOutcome>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<ProductOutcome> {
        self.outcomes.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.outcomes.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all stored outcomes.
    pub fn clear(&self) {
        self.outcomes.write().unwrap().clear();
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn persist(&self, outcome: &ProductOutcome) -> Result<()> {
        self.outcomes.write().unwrap().push(outcome.clone());
        Ok(())
    }
}
