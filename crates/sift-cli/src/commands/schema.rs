//! Schema command implementation.

use crate::cli::SchemaArgs;
use crate::commands::load_fields;
use crate::error::{CliError, Result};
use sift_domain::FieldDescriptor;
use sift_extractor::SchemaBuilder;
use std::io::Write;

/// Execute the schema command.
pub fn execute_schema(args: SchemaArgs, out: &mut impl Write) -> Result<()> {
    let fields = load_fields(&args.fields)?;
    write_schema(&fields, args.describe, out)
}

fn write_schema(fields: &[FieldDescriptor], describe: bool, out: &mut impl Write) -> Result<()> {
    let extractable: Vec<FieldDescriptor> =
        fields.iter().filter(|f| f.is_extractable()).cloned().collect();
    if extractable.is_empty() {
        return Err(CliError::InvalidInput(
            "no enabled AI fields to build a schema for".into(),
        ));
    }

    let schema = SchemaBuilder::build(&extractable);
    if describe {
        writeln!(out, "{}", schema.description)?;
    } else {
        writeln!(out, "{}", serde_json::to_string_pretty(&schema.json)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_domain::FieldType;

    #[test]
    fn test_schema_skips_manual_fields() {
        let fields = vec![
            FieldDescriptor::new("design", "Design", FieldType::Text),
            FieldDescriptor::new("notes", "Notes", FieldType::Text).manual(),
        ];
        let mut out = Vec::new();
        write_schema(&fields, false, &mut out).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let rendered = json.to_string();
        assert!(rendered.contains("design"));
        assert!(!rendered.contains("notes"));
    }

    #[test]
    fn test_no_extractable_fields_is_an_error() {
        let fields = vec![FieldDescriptor::new("x", "X", FieldType::Text).disabled()];
        let mut out = Vec::new();
        assert!(write_schema(&fields, true, &mut out).is_err());
    }
}
