//! Per-field extraction results

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A quoted span offered as evidence for an extracted value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    /// Quoted text from the source
    pub text: String,

    /// Location label (section name, page, chunk)
    pub location: String,
}

impl Citation {
    /// Create a citation
    pub fn new(text: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: location.into(),
        }
    }
}

/// The `{value, confidence, citations}` envelope for one field of one document
///
/// The shape is identical for initial and update responses; the merger and
/// the UI both rely on that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldExtraction {
    /// Extracted value; shape depends on the field type
    pub value: Value,

    /// Model-reported certainty in [0, 1]
    pub confidence: f64,

    /// Supporting evidence
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl FieldExtraction {
    /// Create an extraction, clamping confidence into [0, 1]
    ///
    /// NaN is treated as zero confidence.
    pub fn new(value: Value, confidence: f64, citations: Vec<Citation>) -> Self {
        Self {
            value,
            confidence: clamp_confidence(confidence),
            citations,
        }
    }

    /// Whether the value carries any content
    ///
    /// `null`, an empty or whitespace-only string and an empty array count
    /// as empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use sift_domain::FieldExtraction;
    /// use serde_json::json;
    ///
    /// assert!(!FieldExtraction::new(json!(""), 0.9, vec![]).has_value());
    /// assert!(FieldExtraction::new(json!(false), 0.9, vec![]).has_value());
    /// ```
    pub fn has_value(&self) -> bool {
        match &self.value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        }
    }
}

/// Clamp a model-reported confidence into [0, 1]
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Running per-field result for one document and one run, keyed by field id
///
/// Ordered so snapshots serialize deterministically.
pub type Accumulator = BTreeMap<String, FieldExtraction>;
