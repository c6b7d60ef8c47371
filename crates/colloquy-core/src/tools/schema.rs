//! Validation of tool arguments against the JSON schema a tool declares.
//!
//! Only the subset the gateway needs is understood: `type: object` with
//! `properties` and `required`, per-property `type` (`string`, `integer`,
//! `number`, `boolean`, `array`, `object`), `minLength`/`maxLength` for
//! strings and `minimum`/`maximum`/`exclusiveMinimum`/`exclusiveMaximum`
//! for numbers. Unknown keywords are ignored.

use serde_json::{Map, Value};

pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
    let args = args
        .as_object()
        .ok_or_else(|| format!("arguments must be a JSON object, found {}", type_name(args)))?;

    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .unwrap_or(&empty);

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for name in required.iter().filter_map(|n| n.as_str()) {
            match args.get(name) {
                None | Some(Value::Null) => {
                    return Err(format!("missing required parameter: {name}"));
                }
                Some(_) => {}
            }
        }
    }

    for (name, value) in args {
        if value.is_null() {
            continue;
        }
        if let Some(property) = properties.get(name) {
            validate_property(name, property, value)?;
        }
    }

    Ok(())
}

fn validate_property(name: &str, property: &Value, value: &Value) -> Result<(), String> {
    let expected = property.get("type").and_then(|t| t.as_str());

    match expected {
        Some("string") => {
            let s = value
                .as_str()
                .ok_or_else(|| mismatch(name, "string", value))?;
            let len = s.trim().chars().count() as u64;
            if let Some(min) = property.get("minLength").and_then(|m| m.as_u64()) {
                if len < min {
                    return Err(if min == 1 {
                        format!("{name} must be a non-empty string")
                    } else {
                        format!("{name} must be at least {min} characters")
                    });
                }
            }
            if let Some(max) = property.get("maxLength").and_then(|m| m.as_u64()) {
                if len > max {
                    return Err(format!("{name} must be at most {max} characters"));
                }
            }
        }
        Some("integer") => {
            let n = value
                .as_i64()
                .ok_or_else(|| mismatch(name, "integer", value))?;
            check_bounds(name, property, n as f64)?;
        }
        Some("number") => {
            let n = value
                .as_f64()
                .ok_or_else(|| mismatch(name, "number", value))?;
            check_bounds(name, property, n)?;
        }
        Some("boolean") if !value.is_boolean() => return Err(mismatch(name, "boolean", value)),
        Some("array") if !value.is_array() => return Err(mismatch(name, "array", value)),
        Some("object") if !value.is_object() => return Err(mismatch(name, "object", value)),
        _ => {}
    }

    Ok(())
}

fn check_bounds(name: &str, property: &Value, n: f64) -> Result<(), String> {
    let bound = |key: &str| property.get(key).and_then(|v| v.as_f64());

    if let Some(min) = bound("exclusiveMinimum") {
        if n <= min {
            return Err(format!("{name} must be greater than {min}, found {n}"));
        }
    }
    if let Some(min) = bound("minimum") {
        if n < min {
            return Err(format!("{name} must be at least {min}, found {n}"));
        }
    }
    if let Some(max) = bound("exclusiveMaximum") {
        if n >= max {
            return Err(format!("{name} must be less than {max}, found {n}"));
        }
    }
    if let Some(max) = bound("maximum") {
        if n > max {
            return Err(format!("{name} must be at most {max}, found {n}"));
        }
    }
    Ok(())
}

fn mismatch(name: &str, expected: &str, value: &Value) -> String {
    format!("{name} must be a {expected}, found {}", type_name(value))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
