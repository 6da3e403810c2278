//! Strict-mode normalisation for OpenAI structured outputs.
//!
//! Callers hand the client a JSON schema built however they like (by hand,
//! from a runtime field catalogue, ...). OpenAI's `strict: true` mode only
//! accepts a subset of JSON Schema, so every schema goes through
//! [`enforce_strict`] before it is sent.
//!
//! # Example
//!
//! ```rust,ignore
//! use openai_client::schema::strict_schema;
//! use serde_json::json;
//!
//! let schema = strict_schema(json!({
//!     "type": "object",
//!     "properties": { "calories": { "type": "string" } }
//! }));
//! assert_eq!(schema["additionalProperties"], false);
//! ```

use serde_json::Value;

/// Normalise a schema in place for OpenAI strict mode.
///
/// OpenAI requires:
/// 1. `additionalProperties: false` on all object schemas
/// 2. ALL properties listed in `required`, even nullable ones
/// 3. Fully inlined schemas (no `$ref` references)
pub fn enforce_strict(value: &mut Value) {
    fix_object_schemas(value);
    inline_refs(value);

    if let Value::Object(map) = value {
        map.remove("definitions");
        map.remove("$defs");
        map.remove("$schema");
    }
}

/// Owned variant of [`enforce_strict`].
pub fn strict_schema(mut value: Value) -> Value {
    enforce_strict(&mut value);
    value
}

fn is_object_type(map: &serde_json::Map<String, Value>) -> bool {
    match map.get("type") {
        Some(Value::String(t)) => t == "object",
        Some(Value::Array(types)) => types.iter().any(|t| t == "object"),
        _ => false,
    }
}

/// Adds `additionalProperties: false` and ensures all properties are in `required`.
fn fix_object_schemas(value: &mut Value) {
    if let Value::Object(map) = value {
        if is_object_type(map) {
            map.insert("additionalProperties".to_string(), Value::Bool(false));

            if let Some(Value::Object(props)) = map.get("properties") {
                let all_keys: Vec<Value> = props.keys().map(|k| Value::String(k.clone())).collect();
                map.insert("required".to_string(), Value::Array(all_keys));
            }
        }

        for (_, v) in map.iter_mut() {
            fix_object_schemas(v);
        }
    } else if let Value::Array(arr) = value {
        for item in arr.iter_mut() {
            fix_object_schemas(item);
        }
    }
}

/// Inline `$ref` references from `definitions` / `$defs`.
fn inline_refs(value: &mut Value) {
    let definitions = match value {
        Value::Object(map) => map.get("definitions").or_else(|| map.get("$defs")).cloned(),
        _ => None,
    };

    if let Some(defs) = definitions {
        inline_refs_recursive(value, &defs);
    }
}

fn inline_refs_recursive(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(ref_path)) = map.get("$ref").cloned() {
                let type_name = ref_path
                    .strip_prefix("#/definitions/")
                    .or_else(|| ref_path.strip_prefix("#/$defs/"));
                if let Some(def) = type_name.and_then(|name| definitions.get(name)) {
                    *value = def.clone();
                    inline_refs_recursive(value, definitions);
                    return;
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs_recursive(v, definitions);
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                inline_refs_recursive(item, definitions);
            }
        }
        _ => {}
    }
}
