//! Coercion of raw model output into schema-conforming values.
//!
//! Nonconforming values are coerced to the nearest valid reading or to
//! `undetermined`. Only a required field that cannot resolve is rejected.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

use crate::error::{AttributionError, Result};
use crate::types::record::{CandidateRecord, FieldValue, UNDETERMINED};
use crate::types::schema::{AttributeSchema, FieldSpec, FieldType};
use crate::types::source::SourceTier;

fn is_sentinel(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let s = s.trim();
            s.is_empty() || s.eq_ignore_ascii_case(UNDETERMINED) || s == "[]"
        }
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("Yes".into()),
        Value::Bool(false) => Some("No".into()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(as_text).filter(|s| !s.is_empty()).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "yes" | "true" | "y" => Some(true),
            "no" | "false" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|n| n.is_finite()),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn coerce_enum(domain: &[String], value: &Value) -> Option<String> {
    let text = as_text(value)?;
    let wanted = collapse(&text);
    domain.iter().find(|d| collapse(d) == wanted).cloned()
}

fn coerce_list(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(as_text).collect(),
        Value::String(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
        other => vec![as_text(other)?],
    };
    let items: Vec<String> = items.into_iter().filter(|s| !s.is_empty()).collect();
    (!items.is_empty()).then_some(items)
}

/// Coerce one raw value against its field spec.
///
/// `raw` is `None` when the key was missing from the model output.
pub fn coerce_value(spec: &FieldSpec, raw: Option<&Value>) -> Result<FieldValue> {
    let coerced = match raw {
        None => None,
        Some(v) if is_sentinel(v) => None,
        Some(v) => {
            let value = match &spec.field_type {
                FieldType::Boolean => coerce_bool(v).map(FieldValue::Bool),
                FieldType::Numeric => coerce_number(v).map(FieldValue::Number),
                FieldType::Text => as_text(v).filter(|s| !s.is_empty()).map(FieldValue::Text),
                FieldType::Enumeration(domain) => coerce_enum(domain, v).map(FieldValue::Text),
                FieldType::TextList => coerce_list(v).map(FieldValue::List),
            };
            if value.is_none() {
                debug!(field = %spec.name, raw = %v, "Value outside field domain, coerced to undetermined");
            }
            value
        }
    };

    match coerced {
        Some(value) => Ok(value),
        None if spec.accepts_undetermined() => Ok(FieldValue::Undetermined),
        None => Err(AttributionError::MalformedOutput {
            field: spec.name.clone(),
            reason: match raw {
                None => "required field missing".into(),
                Some(v) => format!("required field has no usable value: {v}"),
            },
        }),
    }
}

/// Coerce every schema field out of a JSON object, in schema order.
/// Keys the schema does not know are ignored.
pub fn coerce_fields(
    schema: &AttributeSchema,
    object: &Map<String, Value>,
) -> Result<IndexMap<String, FieldValue>> {
    schema
        .fields
        .iter()
        .map(|spec| Ok((spec.name.clone(), coerce_value(spec, object.get(&spec.name))?)))
        .collect()
}

/// Build a [`CandidateRecord`] from a raw structured response.
pub fn coerce_candidate(
    schema: &AttributeSchema,
    url: &str,
    tier: SourceTier,
    raw: &Value,
) -> Result<CandidateRecord> {
    let object = raw.as_object().ok_or_else(|| AttributionError::MalformedOutput {
        field: "<root>".into(),
        reason: format!("expected a JSON object, got {}", kind_of(raw)),
    })?;

    let is_match = object.get("is_match").and_then(coerce_bool).unwrap_or(false);
    let log = object
        .get("log")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(CandidateRecord {
        url: url.to_string(),
        tier,
        is_match,
        fields: coerce_fields(schema, object)?,
        log,
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A field that does not conform to its schema declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

fn conforms(spec: &FieldSpec, value: &FieldValue) -> std::result::Result<(), String> {
    match (&spec.field_type, value) {
        (_, FieldValue::Undetermined) if spec.accepts_undetermined() => Ok(()),
        (_, FieldValue::Undetermined) => Err("required field is undetermined".into()),
        (FieldType::Boolean, FieldValue::Bool(_)) => Ok(()),
        (FieldType::Numeric, FieldValue::Number(n)) if n.is_finite() => Ok(()),
        (FieldType::Text, FieldValue::Text(s)) if !s.trim().is_empty() => Ok(()),
        (FieldType::TextList, FieldValue::List(items)) if !items.is_empty() => Ok(()),
        (FieldType::Enumeration(domain), FieldValue::Text(s)) => {
            if domain.iter().any(|d| d == s) {
                Ok(())
            } else {
                Err(format!("{s:?} is not one of {}", domain.join(", ")))
            }
        }
        (field_type, value) => Err(format!("expected {}, got {value:?}", field_type.label())),
    }
}

/// Check that a field map conforms to the schema: every field present,
/// nothing extra, every value of the declared type and domain.
pub fn validate(
    schema: &AttributeSchema,
    fields: &IndexMap<String, FieldValue>,
) -> std::result::Result<(), Vec<Violation>> {
    let mut violations = Vec::new();

    for spec in &schema.fields {
        match fields.get(&spec.name) {
            None => violations.push(Violation {
                field: spec.name.clone(),
                reason: "missing".into(),
            }),
            Some(value) => {
                if let Err(reason) = conforms(spec, value) {
                    violations.push(Violation {
                        field: spec.name.clone(),
                        reason,
                    });
                }
            }
        }
    }

    for name in fields.keys() {
        if schema.get(name).is_none() {
            violations.push(Violation {
                field: name.clone(),
                reason: "not declared by the schema".into(),
            });
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}
