//! Schema registry.
//!
//! Maps a task name ("nutrition", "ingredients", "allergens") or a product
//! category ("beef", "shrimp") to its [`AttributeSchema`] and finalized
//! variant. Lookups are case-insensitive.

pub mod builtin;

use indexmap::IndexMap;

use crate::error::{AttributionError, Result};
use crate::types::schema::{AttributeSchema, FieldSpec, FinalizedSchema};

/// Registered schemas keyed by normalized name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: IndexMap<String, AttributeSchema>,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl SchemaRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in task and category schemas.
    pub fn builtin() -> Self {
        builtin::all()
            .into_iter()
            .fold(Self::new(), |registry, schema| registry.with_schema(schema))
    }

    /// Add or replace a schema.
    pub fn with_schema(mut self, schema: AttributeSchema) -> Self {
        self.register(schema);
        self
    }

    /// Add or replace a schema.
    pub fn register(&mut self, schema: AttributeSchema) {
        self.schemas.insert(key(&schema.name), schema);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(&key(name))
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.values().map(|s| s.name.as_str())
    }

    /// Base schema for a task or category.
    pub fn schema(&self, name: &str) -> Result<&AttributeSchema> {
        self.schemas
            .get(&key(name))
            .ok_or_else(|| AttributionError::UnknownTask {
                name: name.to_string(),
            })
    }

    /// Provenance-augmented schema for a task or category.
    pub fn finalized(&self, name: &str) -> Result<FinalizedSchema> {
        self.schema(name).map(AttributeSchema::finalized)
    }

    /// Field names counted by the undetermined-rate gate.
    pub fn gate_fields(&self, name: &str) -> Result<Vec<&str>> {
        Ok(self
            .schema(name)?
            .gate_fields()
            .into_iter()
            .map(|f: &FieldSpec| f.name.as_str())
            .collect())
    }
}
