//! Autocomplete for the token under the cursor.
//!
//! Without a colon the partial text is a field-name prefix; with one, the text
//! after it is a value prefix for an enum field. Matching is a case-insensitive
//! prefix match and results keep schema declaration order.

use std::collections::HashSet;

use serde::Serialize;

use crate::coerce::split_operator;
use crate::schema::{EntitySchema, FieldRegistry, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Field,
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub text: String,
    pub kind: SuggestionKind,
    pub value_type: ValueType,
}

pub fn suggest_with(registry: &FieldRegistry, entity_type: &str, partial: &str) -> Vec<Suggestion> {
    let Some(schema) = registry.entity(entity_type) else {
        return Vec::new();
    };

    let partial = partial.trim_start();
    match partial.split_once(':') {
        None => field_suggestions(schema, partial),
        Some((field, value)) => value_suggestions(schema, field, value),
    }
}

fn starts_with_ignore_case(candidate: &str, prefix_lower: &str) -> bool {
    candidate.to_lowercase().starts_with(prefix_lower)
}

fn field_suggestions(schema: &EntitySchema, prefix: &str) -> Vec<Suggestion> {
    let prefix = prefix.to_lowercase();
    let mut seen = HashSet::new();
    schema
        .names()
        .filter(|(name, _)| starts_with_ignore_case(name, &prefix))
        .filter(|(name, _)| seen.insert(*name))
        .map(|(name, spec)| Suggestion {
            text: format!("{}:", name),
            kind: SuggestionKind::Field,
            value_type: spec.value_type,
        })
        .collect()
}

fn value_suggestions(schema: &EntitySchema, field: &str, partial_value: &str) -> Vec<Suggestion> {
    let Some(values) = schema.lookup(field).and_then(|spec| spec.enum_values()) else {
        return Vec::new();
    };

    let (operator, prefix) = split_operator(partial_value);
    let prefix = prefix.to_lowercase();
    let mut seen = HashSet::new();
    values
        .iter()
        .filter(|value| starts_with_ignore_case(value, &prefix))
        .filter(|value| seen.insert(*value))
        .map(|value| Suggestion {
            text: format!("{}:{}{}", field, operator.prefix(), value),
            kind: SuggestionKind::Value,
            value_type: ValueType::Enum,
        })
        .collect()
}
