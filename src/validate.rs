//! Query validation against one entity type's schema.

use serde::Serialize;
use tracing::debug;

use crate::ast::Condition;
use crate::lexer::tokenize;
use crate::parser::ConditionBuilder;
use crate::schema::FieldRegistry;

pub const EMPTY_QUERY_MESSAGE: &str = "Empty query matches all";
pub const VALID_QUERY_MESSAGE: &str = "Valid query";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Vec<Condition>>,
}

impl Validation {
    fn ok(message: &str, parsed: Option<Vec<Condition>>) -> Self {
        Self {
            valid: true,
            message: message.to_string(),
            parsed,
        }
    }

    fn unknown_field(name: &str) -> Self {
        Self {
            valid: false,
            message: format!("Unknown field: {}", name),
            parsed: None,
        }
    }
}

/// Checks that every field condition names a field (or alias) of
/// `entity_type`. The first unknown field fails the query. Freetext always
/// passes.
pub fn validate_with(registry: &FieldRegistry, query: &str, entity_type: &str) -> Validation {
    if query.trim().is_empty() {
        return Validation::ok(EMPTY_QUERY_MESSAGE, None);
    }

    let tokens = tokenize(query);
    let conditions = ConditionBuilder::new(&tokens, registry, Some(entity_type))
        .build()
        .unwrap_or_default();

    let unknown = conditions
        .iter()
        .filter_map(Condition::as_field)
        .find(|c| registry.lookup(entity_type, &c.original_field).is_none());
    if let Some(condition) = unknown {
        debug!(field = %condition.original_field, entity_type, "unknown field in query");
        return Validation::unknown_field(&condition.original_field);
    }

    Validation::ok(VALID_QUERY_MESSAGE, Some(conditions))
}
