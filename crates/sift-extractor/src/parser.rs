//! Parse model output into per-field extractions

use crate::error::ExtractorError;
use serde_json::{Map, Value};
use sift_domain::{Accumulator, Citation, FieldDescriptor, FieldExtraction, FieldType};
use tracing::warn;

/// Parse raw model text into per-field extractions
///
/// The text must be a bare JSON object. Code fences are not stripped; the
/// prompt forbids them and the schema constrains the output.
pub fn parse_model_text(
    raw: &str,
    fields: &[FieldDescriptor],
) -> Result<Accumulator, ExtractorError> {
    let output: Value = serde_json::from_str(raw.trim())?;
    parse_model_output(&output, fields)
}

/// Parse an already-decoded model output object
///
/// Fields the output does not mention are absent from the result. A
/// malformed entry for one field is skipped with a warning; the rest of the
/// object is still used.
pub fn parse_model_output(
    output: &Value,
    fields: &[FieldDescriptor],
) -> Result<Accumulator, ExtractorError> {
    let object = output.as_object().ok_or_else(|| {
        ExtractorError::InvalidFormat(format!("Expected JSON object, got {}", kind(output)))
    })?;

    let mut parsed = Accumulator::new();
    for field in fields {
        let Some(entry) = object.get(&field.id) else {
            continue;
        };
        match parse_entry(entry, field) {
            Ok(extraction) => {
                parsed.insert(field.id.clone(), extraction);
            }
            Err(e) => {
                warn!("Skipping field '{}': {}", field.id, e);
            }
        }
    }

    Ok(parsed)
}

fn parse_entry(entry: &Value, field: &FieldDescriptor) -> Result<FieldExtraction, String> {
    let obj = entry
        .as_object()
        .ok_or_else(|| format!("entry is {}, not an object", kind(entry)))?;

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| "missing or invalid 'confidence'".to_string())?;

    let mut value = obj.get("value").cloned().unwrap_or(Value::Null);
    if field.field_type == FieldType::MultiSelect && !value.is_null() && !value.is_array() {
        value = Value::Array(vec![value]);
    }

    Ok(FieldExtraction::new(value, confidence, parse_citations(obj)))
}

fn parse_citations(obj: &Map<String, Value>) -> Vec<Citation> {
    let Some(items) = obj.get("citations").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let text = item.get("text").and_then(Value::as_str)?;
            let location = item
                .get("location")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some(Citation::new(text, location))
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("n", "Sample size", FieldType::Number),
            FieldDescriptor::new("design", "Design", FieldType::MultiSelect)
                .with_options(["RCT", "Cohort"]),
            FieldDescriptor::new("blinded", "Blinded", FieldType::Boolean),
        ]
    }

    #[test]
    fn test_parse_valid_output() {
        let output = json!({
            "n": {"value": 120, "confidence": 0.9,
                  "citations": [{"text": "120 adults", "location": "abstract"}]},
            "blinded": {"value": true, "confidence": 0.6, "citations": []}
        });

        let parsed = parse_model_output(&output, &fields()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["n"].value, json!(120));
        assert_eq!(parsed["n"].citations[0].location, "abstract");
        assert!(!parsed.contains_key("design"));
    }

    #[test]
    fn test_top_level_must_be_object() {
        let result = parse_model_output(&json!([1, 2]), &fields());
        assert!(matches!(result, Err(ExtractorError::InvalidFormat(_))));
    }

    #[test]
    fn test_code_fences_are_not_stripped() {
        let raw = "```json\n{\"n\": {\"value\": 1, \"confidence\": 1.0, \"citations\": []}}\n```";
        let result = parse_model_text(raw, &fields());
        assert!(matches!(result, Err(ExtractorError::JsonParse(_))));
    }

    #[test]
    fn test_parse_raw_text() {
        let raw = r#" {"n": {"value": 3, "confidence": 0.5, "citations": []}} "#;
        let parsed = parse_model_text(raw, &fields()).unwrap();
        assert_eq!(parsed["n"].value, json!(3));
    }

    #[test]
    fn test_confidence_is_clamped() {
        let output = json!({"n": {"value": 1, "confidence": 1.7, "citations": []}});
        let parsed = parse_model_output(&output, &fields()).unwrap();
        assert_eq!(parsed["n"].confidence, 1.0);
    }

    #[test]
    fn test_missing_citations_default_to_empty() {
        let output = json!({"n": {"value": 1, "confidence": 0.4}});
        let parsed = parse_model_output(&output, &fields()).unwrap();
        assert!(parsed["n"].citations.is_empty());
    }

    #[test]
    fn test_multi_select_scalar_is_wrapped() {
        let output = json!({"design": {"value": "RCT", "confidence": 0.8, "citations": []}});
        let parsed = parse_model_output(&output, &fields()).unwrap();
        assert_eq!(parsed["design"].value, json!(["RCT"]));
    }

    #[test]
    fn test_malformed_entry_is_skipped() {
        let output = json!({
            "n": "one hundred",
            "blinded": {"value": false, "confidence": "high"},
            "design": {"value": ["Cohort"], "confidence": 0.7, "citations": []}
        });
        let parsed = parse_model_output(&output, &fields()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed.contains_key("design"));
    }

    #[test]
    fn test_unrequested_fields_are_ignored() {
        let output = json!({"extra": {"value": 1, "confidence": 1.0, "citations": []}});
        let parsed = parse_model_output(&output, &fields()).unwrap();
        assert!(parsed.is_empty());
    }
}
