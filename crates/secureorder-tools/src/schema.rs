//! Declared parameter schemas: argument validation and JSON Schema rendering.

use jsonschema::{Draft, JSONSchema, ValidationError};
use serde_json::{json, Map, Number, Value};

use secureorder_core::error::{Result, SecureOrderError};
use secureorder_core::types::{ParamSpec, ParamType};

/// Validate `args` against `params`, returning the normalized argument map.
///
/// Arguments are normalized first: missing or null optional parameters
/// receive their default, numeric strings are coerced for `number`/`integer`
/// parameters, numbers are coerced for `string` parameters. The result is
/// then checked against [`json_schema`], which rejects missing required
/// parameters, wrong types and unknown parameters.
pub fn validate_arguments(params: &[ParamSpec], args: &Map<String, Value>) -> Result<Map<String, Value>> {
    let normalized = normalize(params, args);

    let schema = json_schema(params);
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&schema)
        .map_err(|e| SecureOrderError::ToolValidation(format!("invalid parameter schema: {}", e)))?;

    let instance = Value::Object(normalized.clone());
    if let Err(errors) = compiled.validate(&instance) {
        let messages: Vec<String> = errors.map(|e| describe(&e)).collect();
        return Err(SecureOrderError::ToolValidation(messages.join("; ")));
    }
    Ok(normalized)
}

fn normalize(params: &[ParamSpec], args: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, value) in args {
        if value.is_null() {
            continue;
        }
        let value = match params.iter().find(|p| &p.name == name) {
            Some(param) => coerce(param.kind, value).unwrap_or_else(|| value.clone()),
            None => value.clone(),
        };
        out.insert(name.clone(), value);
    }
    for param in params {
        if let (false, Some(default)) = (out.contains_key(&param.name), &param.default) {
            out.insert(param.name.clone(), default.clone());
        }
    }
    out
}

/// Lenient conversion toward the declared type. `None` leaves the value for
/// the schema check to reject.
fn coerce(kind: ParamType, value: &Value) -> Option<Value> {
    match (kind, value) {
        (ParamType::String, Value::Number(n)) => Some(Value::String(n.to_string())),

        (ParamType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),

        (ParamType::Integer, Value::Number(n)) if !(n.is_i64() || n.is_u64()) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.is_finite())
            .map(|f| json!(f as i64)),
        (ParamType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(|i| json!(i)),

        (ParamType::Boolean, Value::String(s)) => match s.trim() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },

        _ => None,
    }
}

/// Prefix a schema violation with the parameter it concerns.
fn describe(e: &ValidationError<'_>) -> String {
    let path = e.instance_path.to_string();
    match path.trim_start_matches('/') {
        "" => e.to_string(),
        param => format!("'{}': {}", param, e),
    }
}

/// Render declared parameters as a JSON Schema object.
pub fn json_schema(params: &[ParamSpec]) -> Value {
    let mut properties = Map::new();
    for p in params {
        let mut prop = json!({
            "type": p.kind.as_str(),
            "description": p.description,
        });
        if let Some(default) = &p.default {
            prop["default"] = default.clone();
        }
        properties.insert(p.name.clone(), prop);
    }
    let required: Vec<&str> = params
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}
