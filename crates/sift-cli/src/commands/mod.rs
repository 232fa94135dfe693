//! Command implementations.

mod chunks;
mod config;
mod extract;
mod schema;

pub use chunks::execute_chunks;
pub use config::execute_config;
pub use extract::{execute_extract, run_extraction};
pub use schema::execute_schema;

use crate::error::{CliError, Result};
use sift_domain::FieldDescriptor;
use std::path::Path;

/// Read field descriptors from a JSON file.
///
/// Accepts either a bare array or an object with a `fields` array.
pub fn load_fields(path: &Path) -> Result<Vec<FieldDescriptor>> {
    let contents = std::fs::read_to_string(path)?;
    parse_fields(&contents)
}

fn parse_fields(contents: &str) -> Result<Vec<FieldDescriptor>> {
    let value: serde_json::Value = serde_json::from_str(contents)?;
    let list = match value {
        serde_json::Value::Object(mut map) => map
            .remove("fields")
            .ok_or_else(|| CliError::InvalidInput("expected a `fields` array".into()))?,
        other => other,
    };
    let fields: Vec<FieldDescriptor> = serde_json::from_value(list)?;
    if fields.is_empty() {
        return Err(CliError::InvalidInput("field list is empty".into()));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_domain::FieldType;

    #[test]
    fn test_parse_bare_array() {
        let fields = parse_fields(
            r#"[{"id": "n", "name": "Sample size", "type": "number"},
                {"id": "arms", "name": "Arms", "type": "multi_select", "options": ["a", "b"], "isAI": false}]"#,
        )
        .unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].field_type, FieldType::Number);
        assert!(fields[0].is_extractable());
        assert!(!fields[1].is_extractable());
    }

    #[test]
    fn test_parse_wrapped_array() {
        let fields =
            parse_fields(r#"{"fields": [{"id": "d", "name": "Design", "type": "text"}]}"#).unwrap();
        assert_eq!(fields[0].id, "d");
    }

    #[test]
    fn test_empty_list_rejected() {
        assert!(matches!(parse_fields("[]"), Err(CliError::InvalidInput(_))));
        assert!(matches!(
            parse_fields(r#"{"columns": []}"#),
            Err(CliError::InvalidInput(_))
        ));
    }
}
