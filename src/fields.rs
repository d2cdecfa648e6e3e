//! Field lookup in inbound payloads.
//!
//! Endpoints may alias a logical field (`chat_id`, `image_url`, ...) to a
//! dotted path inside the payload through their `field_map`. Lookups never
//! fail: a missing segment, a non-object intermediate or a JSON `null`
//! yields the caller's default.

use serde_json::Value;
use std::collections::HashMap;

use crate::error::Error;

/// Look up `field` in `payload`, following `field_map` when it aliases the field.
pub fn resolve<'a>(
    payload: &'a Value,
    field: &str,
    field_map: &HashMap<String, String>,
) -> Option<&'a Value> {
    let found = match field_map.get(field) {
        Some(path) => {
            let mut current = payload;
            for segment in path.split('.') {
                current = current.as_object()?.get(segment)?;
            }
            Some(current)
        }
        None => payload.as_object()?.get(field),
    };
    found.filter(|value| !value.is_null())
}

/// Like [`resolve`], returning an owned copy or `default`.
pub fn resolve_or(
    payload: &Value,
    field: &str,
    field_map: &HashMap<String, String>,
    default: Value,
) -> Value {
    resolve(payload, field, field_map).cloned().unwrap_or(default)
}

/// String form of a scalar field; numbers and booleans are stringified.
pub fn resolve_string(
    payload: &Value,
    field: &str,
    field_map: &HashMap<String, String>,
) -> Option<String> {
    resolve(payload, field, field_map).and_then(scalar_to_string)
}

/// String forms of a list field, or of a single scalar promoted to a list.
pub fn resolve_strings(
    payload: &Value,
    field: &str,
    field_map: &HashMap<String, String>,
) -> Vec<String> {
    match resolve(payload, field, field_map) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(other) => scalar_to_string(other).into_iter().collect(),
        None => Vec::new(),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Destinations for one request: payload `chat_ids` win over payload
/// `chat_id`, which wins over the endpoint's configured chats.
pub fn resolve_destinations(
    payload: &Value,
    field_map: &HashMap<String, String>,
    configured: Vec<String>,
) -> Result<Vec<String>, Error> {
    let from_list = resolve_strings(payload, "chat_ids", field_map);
    let destinations = if !from_list.is_empty() {
        from_list
    } else if let Some(single) = resolve_string(payload, "chat_id", field_map) {
        vec![single]
    } else {
        configured
    };

    if destinations.is_empty() {
        return Err(Error::NoDestination);
    }
    Ok(destinations)
}
