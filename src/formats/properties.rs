use crate::error::FormatError;
use serde_json::{Map, Value};

/// Parse `key=value` lines into a flat JSON object. Comment (`#`) and blank
/// lines are dropped; lines without `=` are ignored.
pub fn properties_to_structured(text: &str) -> Map<String, Value> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), Value::String(value.trim().to_string())))
        .collect()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Render a flat or one-level-nested object as `key=value` lines; nested
/// keys join with `.`. Deeper nesting is rendered as JSON text.
pub fn structured_to_properties(object: &Map<String, Value>) -> String {
    let mut lines = Vec::with_capacity(object.len());
    for (key, value) in object {
        match value {
            Value::Object(nested) => {
                for (sub_key, sub_value) in nested {
                    lines.push(format!("{key}.{sub_key}={}", scalar_text(sub_value)));
                }
            }
            other => lines.push(format!("{key}={}", scalar_text(other))),
        }
    }
    lines.join("\n")
}

/// Properties text to pretty JSON text.
pub fn properties_to_json(text: &str) -> Result<String, FormatError> {
    let object = properties_to_structured(text);
    Ok(serde_json::to_string_pretty(&Value::Object(object))?)
}

/// JSON text to properties text.
pub fn json_to_properties(text: &str) -> Result<String, FormatError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(object) => Ok(structured_to_properties(&object)),
        _ => Err(FormatError::NotAnObject),
    }
}
