use serde::Serialize;
use serde_json::Value;

/// Recursively replaces every non-finite numeric leaf with null. Total over
/// any JSON shape, idempotent, and order-preserving for both objects and
/// arrays. Every emitted payload goes through this before serialization.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Value::Null,
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, sanitize(v))).collect())
        }
        other => other,
    }
}

/// Serializes a result structure into a sanitizer-safe JSON value.
pub fn to_sanitized_value<T: Serialize>(value: &T) -> serde_json::Result<Value> {
    Ok(sanitize(serde_json::to_value(value)?))
}
