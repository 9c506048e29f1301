//! Turns declarative parameter mappings into concrete tool-call arguments.

use hookwork_runtime::hooks::{MappingSource, ParameterMapping};
use hookwork_runtime::template;
use hookwork_runtime::TriggerContext;
use serde_json::{Map, Number, Value};
use tracing::debug;

/// Resolve every mapping against the trigger context. `schema` is the tool's
/// declared input schema, used to type literal values.
pub fn resolve_arguments(
    mappings: &[ParameterMapping],
    ctx: &TriggerContext,
    schema: &Value,
) -> Value {
    let mut args = Map::new();
    for mapping in mappings {
        let value = match mapping.source {
            MappingSource::Context => match ctx.lookup(&mapping.value) {
                Some(Value::Null) | None => {
                    debug!(param = %mapping.tool_param, path = %mapping.value, "Context value missing; parameter omitted");
                    continue;
                }
                Some(v) => v,
            },
            MappingSource::Template => Value::String(template::expand(&mapping.value, ctx)),
            MappingSource::Literal => {
                coerce_literal(&mapping.value, declared_type(schema, &mapping.tool_param))
            }
        };
        args.insert(mapping.tool_param.clone(), value);
    }
    Value::Object(args)
}

/// JSON-schema `type` of one property. Union types use their first non-null member.
fn declared_type<'a>(schema: &'a Value, param: &str) -> Option<&'a str> {
    match schema.pointer(&format!("/properties/{}/type", param))? {
        Value::String(t) => Some(t.as_str()),
        Value::Array(types) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    }
}

/// Parse `raw` as the declared type; anything that does not parse stays a string
pub fn coerce_literal(raw: &str, declared: Option<&str>) -> Value {
    let trimmed = raw.trim();
    let parsed = match declared {
        Some("integer") => trimmed.parse::<i64>().ok().map(Value::from),
        Some("number") => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        Some("boolean") => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        Some("object") => serde_json::from_str::<Value>(trimmed).ok().filter(Value::is_object),
        Some("array") => serde_json::from_str::<Value>(trimmed).ok().filter(Value::is_array),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::String(raw.to_string()))
}
