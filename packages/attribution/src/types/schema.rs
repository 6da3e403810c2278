//! Attribute schemas and their provenance-augmented finalized form.

use serde::{Deserialize, Serialize};

/// Semantic type of a schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "domain", rename_all = "snake_case")]
pub enum FieldType {
    /// Yes / no
    Boolean,

    /// Free text
    Text,

    /// Closed set of allowed values
    Enumeration(Vec<String>),

    /// A number
    Numeric,

    /// List of free-text items (e.g. ingredients)
    TextList,
}

impl FieldType {
    /// Allowed values for enumerations.
    pub fn domain(&self) -> Option<&[String]> {
        match self {
            Self::Enumeration(values) => Some(values),
            _ => None,
        }
    }

    /// Short name used in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::Enumeration(_) => "enumeration",
            Self::Numeric => "number",
            Self::TextList => "list of text",
        }
    }
}

/// One typed field of an [`AttributeSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub description: String,

    /// Required fields must resolve to a value; every other field accepts
    /// the `undetermined` sentinel.
    #[serde(default)]
    pub required: bool,

    /// Identity fields (product name as scraped, serving size) are expected
    /// to always resolve and are excluded from undetermined-rate checks.
    #[serde(default)]
    pub identity: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            description: String::new(),
            required: false,
            identity: false,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Numeric)
    }

    pub fn text_list(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::TextList)
    }

    pub fn enumeration<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            FieldType::Enumeration(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Set the description shown to the model.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the field as an identity field.
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn accepts_undetermined(&self) -> bool {
        !self.required
    }
}

/// A named, versioned set of typed fields for one task or product category.
///
/// Schemas are defined up front and never mutated while a pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSchema {
    /// Registry key, e.g. "nutrition" or "beef"
    pub name: String,

    pub version: u32,

    /// Label used in provenance field names, e.g. "Nutrition"
    pub label: String,

    #[serde(default)]
    pub description: String,

    pub fields: Vec<FieldSpec>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            label: label.into(),
            description: String::new(),
            fields: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a field.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Non-identity fields, the ones the undetermined-rate gate counts.
    pub fn gate_fields(&self) -> Vec<&FieldSpec> {
        self.fields.iter().filter(|f| !f.identity).collect()
    }

    /// Compose this schema with its provenance block.
    pub fn finalized(&self) -> FinalizedSchema {
        FinalizedSchema::new(self.clone())
    }
}

/// Provenance field names added to a finalized record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceFields {
    pub primary_url: String,
    pub secondary_urls: String,
    pub confidence_score: String,
    pub confidence_explanation: String,
}

impl ProvenanceFields {
    /// Provenance names for a schema label, e.g. `Primary_Beef_URL`.
    pub fn for_label(label: &str) -> Self {
        Self {
            primary_url: format!("Primary_{label}_URL"),
            secondary_urls: format!("Secondary_{label}_URLs"),
            confidence_score: format!("Confidence_Score_{label}"),
            confidence_explanation: format!("Confidence_Explanation_{label}"),
        }
    }

    pub fn names(&self) -> [&str; 4] {
        [
            &self.primary_url,
            &self.secondary_urls,
            &self.confidence_score,
            &self.confidence_explanation,
        ]
    }
}

/// A base schema plus its provenance block, combined structurally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedSchema {
    pub base: AttributeSchema,
    pub provenance: ProvenanceFields,
}

impl FinalizedSchema {
    pub fn new(base: AttributeSchema) -> Self {
        let provenance = ProvenanceFields::for_label(&base.label);
        Self { base, provenance }
    }

    pub fn task(&self) -> &str {
        &self.base.name
    }

    /// Base field names followed by the provenance names.
    pub fn field_names(&self) -> Vec<&str> {
        self.base
            .field_names()
            .chain(self.provenance.names())
            .collect()
    }
}
