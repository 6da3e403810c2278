//! Candidate and finalized records.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::config::ArbitrationMode;
use super::schema::{AttributeSchema, FinalizedSchema};
use super::source::SourceTier;

/// Sentinel meaning "no evidence for this field".
pub const UNDETERMINED: &str = "undetermined";

/// A coerced field value.
///
/// `Undetermined` serializes as the literal string `"undetermined"`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Undetermined,
    Bool(bool),
    Text(String),
    Number(f64),
    List(Vec<String>),
}

impl FieldValue {
    /// True for the sentinel and for the empty shapes the model uses to say
    /// the same thing (`""`, `[]`).
    pub fn is_no_information(&self) -> bool {
        match self {
            Self::Undetermined => true,
            Self::Text(s) => {
                let s = s.trim();
                s.is_empty() || s.eq_ignore_ascii_case(UNDETERMINED) || s == "[]"
            }
            Self::List(items) => items.is_empty(),
            Self::Bool(_) => false,
            Self::Number(n) => !n.is_finite(),
        }
    }

    pub fn is_determined(&self) -> bool {
        !self.is_no_information()
    }

    /// Key used to decide whether two sources agree on a value.
    pub fn agreement_key(&self) -> String {
        match self {
            Self::Undetermined => UNDETERMINED.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Text(s) => normalize_text(s),
            Self::Number(n) => format_number(*n),
            Self::List(items) => items
                .iter()
                .map(|i| normalize_text(i))
                .collect::<Vec<_>>()
                .join("|"),
        }
    }

    /// Loose conversion used when reading records back from JSON.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Undetermined,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Undetermined),
            Value::String(s) if s.trim().eq_ignore_ascii_case(UNDETERMINED) => Self::Undetermined,
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::List(
                items
                    .iter()
                    .map(|i| match i {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            Value::Object(_) => Self::Text(value.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Undetermined => Value::String(UNDETERMINED.to_string()),
            Self::Bool(b) => Value::Bool(*b),
            Self::Text(s) => Value::String(s.clone()),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(UNDETERMINED.to_string())),
            Self::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        }
    }
}

fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undetermined => f.write_str(UNDETERMINED),
            Self::Bool(true) => f.write_str("Yes"),
            Self::Bool(false) => f.write_str("No"),
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}

/// Per-source extraction result for one (product, url, task).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub url: String,
    pub tier: SourceTier,

    /// Whether the document concerns the target product. `false` means
    /// "no evidence", as opposed to "genuinely undetermined".
    pub is_match: bool,

    /// Schema fields in schema order
    pub fields: IndexMap<String, FieldValue>,

    /// Free-text note the model left about its reading of the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

impl CandidateRecord {
    /// A record carrying no evidence: every field undetermined, not a match.
    pub fn no_evidence(schema: &AttributeSchema, url: impl Into<String>, tier: SourceTier) -> Self {
        Self {
            url: url.into(),
            tier,
            is_match: false,
            fields: schema
                .field_names()
                .map(|name| (name.to_string(), FieldValue::Undetermined))
                .collect(),
            log: None,
        }
    }

    /// Field value, treating absent fields as undetermined.
    pub fn value(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&FieldValue::Undetermined)
    }
}

/// The arbitrated, provenance-annotated output for one product and task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedRecord {
    pub task: String,
    pub schema_version: u32,
    pub fields: IndexMap<String, FieldValue>,
    pub primary_source_url: String,

    /// Supporting sources, primary excluded
    pub secondary_source_urls: Vec<String>,

    /// In [0, 1]
    pub confidence_score: f64,
    pub confidence_explanation: String,

    /// How field values were arbitrated
    pub arbitration: ArbitrationMode,

    /// sha256 of the serialized evidence the record was built from
    pub evidence_digest: String,

    /// Hash of the parser and finalizer prompts the record was produced with
    #[serde(default)]
    pub prompt_version: String,

    /// Integrity repairs applied to model output (dropped URLs, rescaled
    /// confidence)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provenance_notes: Vec<String>,
}

impl FinalizedRecord {
    pub fn value(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&FieldValue::Undetermined)
    }

    /// Flat JSON with provenance under the schema's labeled names
    /// (`Primary_Nutrition_URL`, ...), the shape downstream tables expect.
    pub fn to_labeled_json(&self, schema: &FinalizedSchema) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        let p = &schema.provenance;
        map.insert(p.primary_url.clone(), self.primary_source_url.clone().into());
        map.insert(
            p.secondary_urls.clone(),
            serde_json::Value::from(self.secondary_source_urls.clone()),
        );
        map.insert(p.confidence_score.clone(), self.confidence_score.into());
        map.insert(
            p.confidence_explanation.clone(),
            self.confidence_explanation.clone().into(),
        );
        serde_json::Value::Object(map)
    }
}
