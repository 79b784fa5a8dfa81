//! Schema transformation utilities for structured outputs.

use serde_json::{Map, Value};

/// Keys a Gemini `responseSchema` node may carry. Everything else is dropped.
const SUPPORTED_KEYS: &[&str] = &[
    "type",
    "description",
    "enum",
    "required",
    "nullable",
    "format",
    "properties",
    "items",
    "anyOf",
    "propertyOrdering",
];

/// String formats the provider accepts.
const STRING_FORMATS: &[&str] = &["enum", "date-time"];

/// `$ref` chains deeper than this collapse to a plain object.
const MAX_REF_DEPTH: usize = 16;

/// Generate a provider-ready output schema from a Rust type using schemars.
pub fn output_schema<T: schemars::JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let value = serde_json::to_value(schema).unwrap_or_default();
    sanitize_for_gemini(value)
}

/// Rewrite a JSON Schema into the OpenAPI subset Gemini accepts:
/// - `$ref` is inlined from the schema's own `$defs` / `definitions`
/// - `Option<T>` shapes (`["T", "null"]`, `anyOf [T, null]`) become `nullable: true`
/// - unsupported keywords (`$schema`, `title`, `additionalProperties`,
///   numeric and length bounds, non-string `format`) are removed
pub fn sanitize_for_gemini(schema: Value) -> Value {
    let defs = schema
        .get("$defs")
        .or_else(|| schema.get("definitions"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    transform_node(schema, &defs, 0)
}

fn transform_node(node: Value, defs: &Map<String, Value>, depth: usize) -> Value {
    let mut map = match node {
        Value::Object(map) => map,
        Value::Bool(true) => return Value::Object(Map::new()),
        other => return other,
    };

    if let Some(Value::String(reference)) = map.get("$ref") {
        let name = reference.rsplit('/').next().unwrap_or_default();
        let resolved = match defs.get(name) {
            Some(target) if depth < MAX_REF_DEPTH => {
                transform_node(target.clone(), defs, depth + 1)
            }
            _ => serde_json::json!({ "type": "object" }),
        };
        return with_description(resolved, map.remove("description"));
    }

    if let Some(variants) = map
        .remove("anyOf")
        .or_else(|| map.remove("oneOf"))
        .and_then(|v| match v {
            Value::Array(items) => Some(items),
            _ => None,
        })
    {
        let total = variants.len();
        let non_null: Vec<Value> = variants.into_iter().filter(|v| !is_null_type(v)).collect();
        let nullable = non_null.len() < total;

        if let [single] = non_null.as_slice() {
            let mut inner = transform_node(single.clone(), defs, depth);
            if nullable && let Value::Object(ref mut inner_map) = inner {
                inner_map.insert("nullable".into(), Value::Bool(true));
            }
            return with_description(inner, map.remove("description"));
        }

        let transformed: Vec<Value> = non_null
            .into_iter()
            .map(|v| transform_node(v, defs, depth))
            .collect();
        map.insert("anyOf".into(), Value::Array(transformed));
        if nullable {
            map.insert("nullable".into(), Value::Bool(true));
        }
    }

    let mut out = Map::new();
    for (key, value) in map {
        if !SUPPORTED_KEYS.contains(&key.as_str()) {
            continue;
        }
        match key.as_str() {
            "type" => insert_type(&mut out, value),
            "properties" => {
                let props = match value {
                    Value::Object(props) => props
                        .into_iter()
                        .map(|(name, schema)| (name, transform_node(schema, defs, depth)))
                        .collect(),
                    _ => Map::new(),
                };
                out.insert(key, Value::Object(props));
            }
            "items" => {
                out.insert(key, transform_node(value, defs, depth));
            }
            _ => {
                out.insert(key, value);
            }
        }
    }

    let is_string = out.get("type").and_then(Value::as_str) == Some("string");
    let keep_format = is_string
        && out
            .get("format")
            .and_then(Value::as_str)
            .is_some_and(|f| STRING_FORMATS.contains(&f));
    if !keep_format {
        out.remove("format");
    }

    Value::Object(out)
}

fn insert_type(out: &mut Map<String, Value>, value: Value) {
    match value {
        Value::Array(types) => {
            let total = types.len();
            let concrete: Vec<Value> = types.into_iter().filter(|t| t != "null").collect();
            if concrete.len() < total {
                out.insert("nullable".into(), Value::Bool(true));
            }
            if let Some(first) = concrete.into_iter().next() {
                out.insert("type".into(), first);
            }
        }
        other => {
            out.insert("type".into(), other);
        }
    }
}

fn is_null_type(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("null")
}

fn with_description(mut node: Value, description: Option<Value>) -> Value {
    if let (Value::Object(map), Some(description)) = (&mut node, description) {
        map.insert("description".into(), description);
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strips_unsupported_keywords() {
        let schema = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "title": "PoemOutput",
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "title": {"type": "string", "minLength": 1},
                "count": {"type": "integer", "format": "uint32", "minimum": 0}
            },
            "required": ["title", "count"]
        });

        let result = sanitize_for_gemini(schema);

        assert!(result.get("$schema").is_none());
        assert!(result.get("title").is_none());
        assert!(result.get("additionalProperties").is_none());
        assert_eq!(result["properties"]["title"], json!({"type": "string"}));
        assert_eq!(result["properties"]["count"], json!({"type": "integer"}));
        assert_eq!(result["required"], json!(["title", "count"]));
    }

    #[test]
    fn test_nullable_type_array() {
        let schema = json!({"type": ["string", "null"], "description": "mood"});
        let result = sanitize_for_gemini(schema);
        assert_eq!(
            result,
            json!({"type": "string", "nullable": true, "description": "mood"})
        );
    }

    #[test]
    fn test_inlines_refs_and_nullable_any_of() {
        let schema = json!({
            "type": "object",
            "properties": {
                "analysis": {
                    "anyOf": [{"$ref": "#/$defs/Analysis"}, {"type": "null"}]
                }
            },
            "$defs": {
                "Analysis": {
                    "type": "object",
                    "properties": {"mood": {"type": "string"}},
                    "required": ["mood"]
                }
            }
        });

        let result = sanitize_for_gemini(schema);

        assert!(result.get("$defs").is_none());
        let analysis = &result["properties"]["analysis"];
        assert_eq!(analysis["type"], "object");
        assert_eq!(analysis["nullable"], true);
        assert_eq!(analysis["properties"]["mood"]["type"], "string");
    }

    #[test]
    fn test_recursive_ref_is_bounded() {
        let schema = json!({
            "$ref": "#/$defs/Node",
            "$defs": {
                "Node": {
                    "type": "object",
                    "properties": {"child": {"$ref": "#/$defs/Node"}}
                }
            }
        });

        let result = sanitize_for_gemini(schema);
        assert_eq!(result["type"], "object");
    }

    #[test]
    fn test_output_schema_from_type() {
        #[derive(schemars::JsonSchema)]
        #[allow(dead_code)]
        struct Output {
            title: String,
            lines: Vec<String>,
            note: Option<String>,
        }

        let schema = output_schema::<Output>();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["title"]["type"], "string");
        assert_eq!(schema["properties"]["lines"]["type"], "array");
        assert_eq!(schema["properties"]["lines"]["items"]["type"], "string");
        assert_eq!(schema["properties"]["note"]["nullable"], true);
    }
}
