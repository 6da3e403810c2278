//! Output contracts (JSON schemas) built from attribute schemas at runtime.
//!
//! Every field accepts the `undetermined` sentinel alongside its typed
//! shape, so a strict-mode model can always say "no evidence".

use serde_json::{json, Map, Value};

use crate::traits::model::ResponseSchema;
use crate::types::record::UNDETERMINED;
use crate::types::schema::{AttributeSchema, FieldSpec, FieldType, FinalizedSchema};

fn sentinel() -> Value {
    json!({ "type": "string", "enum": [UNDETERMINED] })
}

fn field_schema(spec: &FieldSpec) -> Value {
    let mut schema = match &spec.field_type {
        FieldType::Boolean => json!({ "anyOf": [{ "type": "boolean" }, sentinel()] }),
        FieldType::Numeric => json!({ "anyOf": [{ "type": "number" }, sentinel()] }),
        FieldType::Text => json!({ "type": "string" }),
        FieldType::TextList => json!({ "type": "array", "items": { "type": "string" } }),
        FieldType::Enumeration(values) => {
            let mut domain: Vec<Value> = values.iter().cloned().map(Value::String).collect();
            if spec.accepts_undetermined() {
                domain.push(Value::String(UNDETERMINED.to_string()));
            }
            json!({ "type": "string", "enum": domain })
        }
    };

    if !spec.description.is_empty() {
        if let Value::Object(map) = &mut schema {
            map.insert("description".into(), Value::String(spec.description.clone()));
        }
    }
    schema
}

fn object(properties: Map<String, Value>) -> Value {
    let required: Vec<Value> = properties.keys().cloned().map(Value::String).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Contract for one per-source candidate: `is_match`, every schema field
/// and a free-text `log`.
pub fn candidate_contract(schema: &AttributeSchema) -> ResponseSchema {
    let mut properties = Map::new();
    properties.insert(
        "is_match".into(),
        json!({
            "type": "boolean",
            "description": "Whether the document describes the given product"
        }),
    );
    for spec in &schema.fields {
        properties.insert(spec.name.clone(), field_schema(spec));
    }
    properties.insert("log".into(), json!({ "type": "string" }));

    ResponseSchema {
        name: format!("{}_candidate", schema.name),
        schema: object(properties),
    }
}

/// Contract for the finalized record: schema fields plus provenance.
pub fn finalized_contract(schema: &FinalizedSchema) -> ResponseSchema {
    let mut properties = Map::new();
    for spec in &schema.base.fields {
        properties.insert(spec.name.clone(), field_schema(spec));
    }

    let p = &schema.provenance;
    properties.insert(p.primary_url.clone(), json!({ "type": "string" }));
    properties.insert(
        p.secondary_urls.clone(),
        json!({ "type": "array", "items": { "type": "string" } }),
    );
    properties.insert(
        p.confidence_score.clone(),
        json!({ "type": "number", "description": "Between 0 and 1" }),
    );
    properties.insert(p.confidence_explanation.clone(), json!({ "type": "string" }));

    ResponseSchema {
        name: format!("{}_finalized", schema.base.name),
        schema: object(properties),
    }
}
