//! Folding per-chunk extractions into the accumulator

use serde::Serialize;
use serde_json::Value;
use sift_domain::{Accumulator, FieldDescriptor, FieldExtraction, FieldType};
use tracing::debug;

/// What happened to one field during a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeDecision {
    /// The chunk said nothing about the field
    Absent,
    /// No usable existing value, incoming adopted
    Adopted,
    /// Incoming had strictly higher confidence
    Replaced,
    /// Multi-select values were unioned
    Unioned,
    /// Existing value kept
    Kept,
}

impl MergeDecision {
    /// Whether the field's entry changed
    pub fn changed(&self) -> bool {
        matches!(
            self,
            MergeDecision::Adopted | MergeDecision::Replaced | MergeDecision::Unioned
        )
    }
}

/// Merge `incoming` into `existing` for the given fields
///
/// Per field, first matching rule wins:
/// 1. absent from `incoming`: unchanged
/// 2. no existing entry or an empty existing value: take `incoming`
/// 3. `incoming.confidence > existing.confidence`: take `incoming`
/// 4. both multi-select arrays: union values, max confidence, concatenate citations
/// 5. otherwise: unchanged
pub fn merge(
    existing: &Accumulator,
    incoming: &Accumulator,
    fields: &[FieldDescriptor],
) -> Accumulator {
    merge_with_decisions(existing, incoming, fields).0
}

/// [`merge`], also reporting the decision taken for every field
pub fn merge_with_decisions(
    existing: &Accumulator,
    incoming: &Accumulator,
    fields: &[FieldDescriptor],
) -> (Accumulator, Vec<(String, MergeDecision)>) {
    let mut merged = existing.clone();
    let mut decisions = Vec::with_capacity(fields.len());

    for field in fields {
        let decision = match incoming.get(&field.id) {
            None => MergeDecision::Absent,
            Some(new) => match merged.get(&field.id) {
                None => {
                    merged.insert(field.id.clone(), new.clone());
                    MergeDecision::Adopted
                }
                Some(old) if !old.has_value() => {
                    merged.insert(field.id.clone(), new.clone());
                    MergeDecision::Adopted
                }
                Some(old) if new.confidence > old.confidence => {
                    merged.insert(field.id.clone(), new.clone());
                    MergeDecision::Replaced
                }
                Some(old) => match union_multi_select(field, old, new) {
                    Some(union) => {
                        merged.insert(field.id.clone(), union);
                        MergeDecision::Unioned
                    }
                    None => MergeDecision::Kept,
                },
            },
        };

        debug!("Merge '{}': {:?}", field.id, decision);
        decisions.push((field.id.clone(), decision));
    }

    (merged, decisions)
}

fn union_multi_select(
    field: &FieldDescriptor,
    old: &FieldExtraction,
    new: &FieldExtraction,
) -> Option<FieldExtraction> {
    if field.field_type != FieldType::MultiSelect {
        return None;
    }
    let (Value::Array(old_values), Value::Array(new_values)) = (&old.value, &new.value) else {
        return None;
    };

    // Existing order first, then first-seen order of new values
    let mut values: Vec<Value> = Vec::with_capacity(old_values.len() + new_values.len());
    for value in old_values.iter().chain(new_values) {
        if !values.contains(value) {
            values.push(value.clone());
        }
    }

    let mut citations = old.citations.clone();
    citations.extend(new.citations.iter().cloned());

    Some(FieldExtraction::new(
        Value::Array(values),
        old.confidence.max(new.confidence),
        citations,
    ))
}

/// Give every field without an entry a null, zero-confidence one
///
/// Returns the ids that were filled.
pub fn fill_missing(accumulator: &mut Accumulator, fields: &[FieldDescriptor]) -> Vec<String> {
    let mut filled = Vec::new();
    for field in fields {
        if !accumulator.contains_key(&field.id) {
            accumulator.insert(
                field.id.clone(),
                FieldExtraction::new(Value::Null, 0.0, Vec::new()),
            );
            filled.push(field.id.clone());
        }
    }
    if !filled.is_empty() {
        debug!("No extraction for {:?}, recorded as empty", filled);
    }
    filled
}
