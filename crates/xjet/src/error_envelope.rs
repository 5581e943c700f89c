//! The canonical error envelope (SPEC_FULL.md §3.1): errors cross the
//! wire as JSON embedded in `Error`/`Events` payloads; this is the
//! stable shape both sides agree on.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerializedError {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub matcher_result: Option<serde_json::Value>,
}

/// Decode a wire error payload: a single object, a JSON array of
/// objects, or (leniently) a bare string message. A JSON parse failure
/// is itself promoted to a `SerializedError` so the pipeline never
/// silently loses a failure (§4.5 error decode contract).
pub fn decode_errors(raw: &str) -> Vec<SerializedError> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items.iter().map(value_to_error).collect(),
        Ok(value) => vec![value_to_error(&value)],
        Err(err) => vec![SerializedError {
            name: "ProtocolError".into(),
            message: format!("failed to parse embedded error JSON: {err}"),
            stack: None,
            matcher_result: None,
        }],
    }
}

fn value_to_error(value: &serde_json::Value) -> SerializedError {
    if let Some(s) = value.as_str() {
        return SerializedError { name: "Error".into(), message: s.to_string(), stack: None, matcher_result: None };
    }
    serde_json::from_value(value.clone()).unwrap_or_else(|_| SerializedError {
        name: "Error".into(),
        message: value.to_string(),
        stack: None,
        matcher_result: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_object() {
        let errors = decode_errors(r#"{"name":"AssertionError","message":"boom"}"#);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, "AssertionError");
    }

    #[test]
    fn decodes_array() {
        let errors = decode_errors(r#"[{"name":"A","message":"a"},{"name":"B","message":"b"}]"#);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn promotes_parse_failure_to_error() {
        let errors = decode_errors("{not json");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, "ProtocolError");
    }

    #[test]
    fn empty_string_decodes_to_no_errors() {
        assert!(decode_errors("").is_empty());
    }
}
