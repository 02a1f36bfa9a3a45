//! Human-readable rendering of stream error payloads.

use crate::types::ErrorPayload;

const UNKNOWN_ERROR: &str = "Unknown error occurred";

/// Render an error payload as the text shown to the user.
pub fn describe_error(payload: &ErrorPayload) -> String {
    match payload {
        ErrorPayload::Native(message) => message.clone(),
        ErrorPayload::Value(value) => describe_value(value),
    }
}

fn describe_value(value: &serde_json::Value) -> String {
    use serde_json::Value;

    match value {
        Value::Null => UNKNOWN_ERROR.to_string(),
        Value::String(text) => text.clone(),
        Value::Object(map) => {
            let message = map.get("message").and_then(Value::as_str);
            let kind = map.get("type").and_then(Value::as_str);
            match (message, kind) {
                (Some(message), Some(kind)) => format!("{kind}: {message}"),
                (Some(message), None) => message.to_string(),
                _ => stringify(value),
            }
        }
        other => stringify(other),
    }
}

fn stringify(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("[{}]", type_tag(value)))
}

fn type_tag(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
