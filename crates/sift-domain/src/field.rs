//! Field descriptors - one user-configured extraction column

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value type of an extraction field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Free text
    Text,
    /// Numeric value
    Number,
    /// True/false
    Boolean,
    /// One of the configured options
    Select,
    /// Any subset of the configured options
    MultiSelect,
    /// ISO-8601 date string
    Date,
    /// URL string
    Url,
}

impl FieldType {
    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Select => "select",
            FieldType::MultiSelect => "multi_select",
            FieldType::Date => "date",
            FieldType::Url => "url",
        }
    }

    /// Whether the type draws its values from `FieldDescriptor::options`
    pub fn uses_options(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::MultiSelect)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definition of one extraction field
///
/// Immutable for the duration of a run. Serialized with the same key names
/// the configuration UI uses (`type`, `isAI`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Stable identifier, used as the key in results
    pub id: String,

    /// Human-readable column name
    pub name: String,

    /// Value type
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Allowed values for select / multi_select
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    /// Optional free-text instruction for the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Whether the field is active
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether the field is filled by the model (as opposed to manually)
    #[serde(rename = "isAI", default = "default_true")]
    pub is_ai: bool,
}

fn default_true() -> bool {
    true
}

impl FieldDescriptor {
    /// Create an enabled AI field with no options or instruction
    ///
    /// # Examples
    ///
    /// ```
    /// use sift_domain::{FieldDescriptor, FieldType};
    ///
    /// let field = FieldDescriptor::new("sample_size", "Sample size", FieldType::Number);
    /// assert!(field.is_extractable());
    /// ```
    pub fn new(id: impl Into<String>, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            field_type,
            options: Vec::new(),
            prompt: None,
            enabled: true,
            is_ai: true,
        }
    }

    /// Set the allowed options
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Set the free-text instruction
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Mark the field disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Mark the field as manually filled
    pub fn manual(mut self) -> Self {
        self.is_ai = false;
        self
    }

    /// Fields that take part in model extraction: `enabled && isAI`
    pub fn is_extractable(&self) -> bool {
        self.enabled && self.is_ai
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_ui_shape() {
        let json = r#"{
            "id": "design",
            "name": "Study design",
            "type": "multi_select",
            "options": ["RCT", "Cohort"],
            "enabled": true,
            "isAI": true
        }"#;

        let field: FieldDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(field.field_type, FieldType::MultiSelect);
        assert_eq!(field.options, vec!["RCT", "Cohort"]);
        assert!(field.prompt.is_none());
        assert!(field.is_extractable());
    }

    #[test]
    fn test_flags_default_to_true() {
        let field: FieldDescriptor =
            serde_json::from_str(r#"{"id": "n", "name": "N", "type": "number"}"#).unwrap();
        assert!(field.enabled);
        assert!(field.is_ai);
    }

    #[test]
    fn test_extractable_requires_both_flags() {
        let base = FieldDescriptor::new("a", "A", FieldType::Text);
        assert!(!base.clone().disabled().is_extractable());
        assert!(!base.clone().manual().is_extractable());
        assert!(base.is_extractable());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(FieldType::MultiSelect.to_string(), "multi_select");
        assert!(FieldType::Select.uses_options());
        assert!(!FieldType::Date.uses_options());
    }
}
