use serde_json::{Map, Value};
use thiserror::Error;

/// Keywords whose value is a single sub schema
const SCHEMA_KEYWORDS: &[&str] = &["items", "additionalProperties", "not"];
/// Keywords whose value is a list of sub schemas
const SCHEMA_LIST_KEYWORDS: &[&str] = &["anyOf", "oneOf", "allOf", "prefixItems"];
/// Keywords whose value is a map of named sub schemas
const SCHEMA_MAP_KEYWORDS: &[&str] = &["$defs", "definitions"];

/// Make a schemars schema palatable for function calling
///
/// Metadata is removed, `["T", "null"]` unions collapse to `T` and only the
/// non nullable properties are listed as required.
pub fn function_schema(mut schema: Value) -> Value {
    visit(&mut schema, &|obj: &mut Map<String, Value>| {
        if let Some(Value::Object(properties)) = obj.get_mut("properties") {
            let mut required = Vec::new();
            for (name, property) in properties.iter_mut() {
                let Value::Object(property) = property else { continue };
                if is_nullable(property) {
                    collapse_null(property);
                } else {
                    required.push(Value::String(name.clone()));
                }
            }
            if required.is_empty() {
                obj.remove("required");
            } else {
                obj.insert("required".to_string(), Value::Array(required));
            }
        }
    });
    schema
}

/// Make a schemars schema acceptable by strict structured outputs
///
/// Every object gets `additionalProperties: false` and lists all of its
/// properties as required, optional fields stay expressed as `["T", "null"]`.
pub fn strict_schema(mut schema: Value) -> Value {
    visit(&mut schema, &|obj: &mut Map<String, Value>| {
        if let Some(Value::Object(properties)) = obj.get("properties") {
            let required: Vec<Value> = properties.keys().cloned().map(Value::String).collect();
            obj.insert("required".to_string(), Value::Array(required));
            obj.insert("additionalProperties".to_string(), Value::Bool(false));
        }
        if obj.get("type").and_then(Value::as_str) != Some("string") {
            obj.remove("format");
        }
    });
    schema
}

fn visit(schema: &mut Value, fix: &dyn Fn(&mut Map<String, Value>)) {
    let Value::Object(obj) = schema else { return };

    obj.remove("$schema");
    obj.remove("title");
    fix(obj);

    if let Some(Value::Object(properties)) = obj.get_mut("properties") {
        for property in properties.values_mut() {
            visit(property, fix);
        }
    }
    for key in SCHEMA_KEYWORDS {
        if let Some(sub) = obj.get_mut(*key) {
            visit(sub, fix);
        }
    }
    for key in SCHEMA_LIST_KEYWORDS {
        if let Some(Value::Array(subs)) = obj.get_mut(*key) {
            subs.iter_mut().for_each(|sub| visit(sub, fix));
        }
    }
    for key in SCHEMA_MAP_KEYWORDS {
        if let Some(Value::Object(subs)) = obj.get_mut(*key) {
            subs.values_mut().for_each(|sub| visit(sub, fix));
        }
    }
}

fn is_nullable(schema: &Map<String, Value>) -> bool {
    let null_type = |types: &Value| match types {
        Value::Array(types) => types.iter().any(|t| t == "null"),
        Value::String(t) => t == "null",
        _ => false,
    };

    schema.get("type").is_some_and(null_type)
        || schema
            .get("anyOf")
            .and_then(Value::as_array)
            .is_some_and(|subs| subs.iter().any(|s| s.get("type").is_some_and(null_type)))
}

fn collapse_null(schema: &mut Map<String, Value>) {
    if let Some(Value::Array(types)) = schema.get("type") {
        let non_null: Vec<Value> = types.iter().filter(|t| *t != "null").cloned().collect();
        if non_null.len() == 1 {
            schema.insert("type".to_string(), non_null[0].clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{path}: {message}")]
pub struct SchemaError {
    /// JSON pointer to the offending value
    pub path: String,
    pub message: String,
}

/// Structural validation of a value against a JSON schema
///
/// Covers the subset produced by schemars and accepted by strict structured
/// outputs: `type`, `enum`, `const`, `properties`, `required`,
/// `additionalProperties`, `items`, `anyOf`, `oneOf`, `allOf` and local `$ref`.
pub fn validate(value: &Value, schema: &Value) -> Result<(), SchemaError> {
    validate_at(value, schema, schema, "")
}

fn validate_at(value: &Value, schema: &Value, root: &Value, path: &str) -> Result<(), SchemaError> {
    let error = |message: String| SchemaError {
        path: if path.is_empty() { "/".to_string() } else { path.to_string() },
        message,
    };

    let obj = match schema {
        Value::Bool(true) => return Ok(()),
        Value::Bool(false) => return Err(error("no value is allowed here".to_string())),
        Value::Object(obj) => obj,
        _ => return Ok(()),
    };

    if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
        let target = reference
            .strip_prefix('#')
            .and_then(|pointer| root.pointer(pointer))
            .ok_or_else(|| error(format!("unresolvable reference {}", reference)))?;
        validate_at(value, target, root, path)?;
    }

    if let Some(types) = obj.get("type") {
        let matches = match types {
            Value::String(t) => type_matches(value, t),
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).any(|t| type_matches(value, t)),
            _ => true,
        };
        if !matches {
            return Err(error(format!("expected {}, got {}", types, type_name(value))));
        }
    }

    if let Some(Value::Array(allowed)) = obj.get("enum") {
        if !allowed.contains(value) {
            return Err(error(format!("{} is not one of {}", value, Value::Array(allowed.clone()))));
        }
    }

    if let Some(expected) = obj.get("const") {
        if expected != value {
            return Err(error(format!("expected constant {}", expected)));
        }
    }

    if let Some(Value::Array(subs)) = obj.get("anyOf") {
        if !subs.iter().any(|sub| validate_at(value, sub, root, path).is_ok()) {
            return Err(error("no alternative matches".to_string()));
        }
    }

    if let Some(Value::Array(subs)) = obj.get("oneOf") {
        match subs.iter().filter(|sub| validate_at(value, sub, root, path).is_ok()).count() {
            1 => {}
            0 => return Err(error("no alternative matches".to_string())),
            n => return Err(error(format!("{} alternatives match, exactly one must", n))),
        }
    }

    if let Some(Value::Array(subs)) = obj.get("allOf") {
        for sub in subs {
            validate_at(value, sub, root, path)?;
        }
    }

    if let Value::Object(fields) = value {
        if let Some(Value::Array(required)) = obj.get("required") {
            for name in required.iter().filter_map(Value::as_str) {
                if !fields.contains_key(name) {
                    return Err(error(format!("missing required property '{}'", name)));
                }
            }
        }

        let properties = obj.get("properties").and_then(Value::as_object);
        for (name, field) in fields {
            let field_path = format!("{}/{}", path, name);
            match properties.and_then(|p| p.get(name)) {
                Some(sub) => validate_at(field, sub, root, &field_path)?,
                None => match obj.get("additionalProperties") {
                    Some(Value::Bool(false)) => {
                        return Err(error(format!("unexpected property '{}'", name)));
                    }
                    Some(sub @ Value::Object(_)) => validate_at(field, sub, root, &field_path)?,
                    _ => {}
                },
            }
        }
    }

    if let (Value::Array(items), Some(sub)) = (value, obj.get("items")) {
        for (index, item) in items.iter().enumerate() {
            validate_at(item, sub, root, &format!("{}/{}", path, index))?;
        }
    }

    Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
