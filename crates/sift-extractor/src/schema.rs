//! Structured-output schema for a set of fields
//!
//! The schema constrains the model's output and is the contract the response
//! parser checks against. Every field uses the same envelope:
//!
//! ```text
//! { "<field id>": { "value": <typed>, "confidence": 0..1,
//!                   "citations": [ { "text": "...", "location": "..." } ] } }
//! ```

use serde_json::{json, Map, Value};
use sift_domain::{FieldDescriptor, FieldType};

/// JSON schema plus a prose rendering for prompts
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSchema {
    /// JSON schema handed to the model invoker
    pub json: Value,

    /// Field-by-field description embedded in prompts
    pub description: String,

    /// Field ids in declaration order
    pub field_ids: Vec<String>,
}

/// Builds [`ExtractionSchema`]s from field descriptors
pub struct SchemaBuilder;

impl SchemaBuilder {
    /// Build the schema; only enabled fields are required
    pub fn build(fields: &[FieldDescriptor]) -> ExtractionSchema {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in fields {
            properties.insert(field.id.clone(), Self::envelope(field));
            if field.enabled {
                required.push(Value::String(field.id.clone()));
            }
        }

        let json = json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        });

        ExtractionSchema {
            json,
            description: Self::describe(fields),
            field_ids: fields.iter().map(|f| f.id.clone()).collect(),
        }
    }

    /// Type constraint for a field's `value`
    pub fn type_constraint(field: &FieldDescriptor) -> Value {
        match field.field_type {
            FieldType::Text => json!({"type": "string"}),
            FieldType::Number => json!({"type": "number"}),
            FieldType::Boolean => json!({"type": "boolean"}),
            FieldType::Select if field.options.is_empty() => json!({"type": "string"}),
            FieldType::Select => json!({"type": "string", "enum": field.options}),
            FieldType::MultiSelect if field.options.is_empty() => {
                json!({"type": "array", "items": {"type": "string"}})
            }
            FieldType::MultiSelect => {
                json!({"type": "array", "items": {"type": "string", "enum": field.options}})
            }
            FieldType::Date => json!({"type": "string", "description": "ISO-8601 date (YYYY-MM-DD)"}),
            FieldType::Url => json!({"type": "string", "description": "Absolute URL"}),
        }
    }

    /// `{value, confidence, citations}` envelope for one field
    ///
    /// `value` may be null when the text says nothing about the field.
    fn envelope(field: &FieldDescriptor) -> Value {
        json!({
            "type": "object",
            "properties": {
                "value": {"anyOf": [Self::type_constraint(field), {"type": "null"}]},
                "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                "citations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "text": {"type": "string"},
                            "location": {"type": "string"}
                        },
                        "required": ["text", "location"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["value", "confidence", "citations"],
            "additionalProperties": false
        })
    }

    fn describe(fields: &[FieldDescriptor]) -> String {
        let mut out = String::new();
        for field in fields {
            out.push_str(&format!(
                "- \"{}\" ({}): {}",
                field.id,
                field.name,
                Self::value_hint(field)
            ));
            if !field.enabled {
                out.push_str(" [optional]");
            }
            if let Some(instruction) = field.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
                out.push_str(&format!("\n  Instruction: {}", instruction.trim()));
            }
            out.push('\n');
        }
        out
    }

    fn value_hint(field: &FieldDescriptor) -> String {
        let options = field
            .options
            .iter()
            .map(|o| format!("\"{}\"", o))
            .collect::<Vec<_>>()
            .join(", ");
        match field.field_type {
            FieldType::Text => "string".to_string(),
            FieldType::Number => "number".to_string(),
            FieldType::Boolean => "true or false".to_string(),
            FieldType::Select if options.is_empty() => "string".to_string(),
            FieldType::Select => format!("exactly one of [{}]", options),
            FieldType::MultiSelect if options.is_empty() => "array of strings".to_string(),
            FieldType::MultiSelect => format!("array of any of [{}]", options),
            FieldType::Date => "date string YYYY-MM-DD".to_string(),
            FieldType::Url => "URL string".to_string(),
        }
    }
}
