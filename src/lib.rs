//! Search query language for the threat-intelligence dashboard.
//!
//! Queries such as `cvss:>=9.0 AND kev:true vendor:*cisco*` are tokenized,
//! resolved against per-entity field schemas, type-coerced and returned as an
//! ordered list of [`Condition`]s. The same schemas drive validation and
//! autocomplete.
//!
//! ```
//! use threat_query::{parse_query, CompOp, Value};
//!
//! let conditions = parse_query("cvss:>=9.0", Some("vulnerabilities")).unwrap();
//! let cvss = conditions[0].as_field().unwrap();
//! assert_eq!(cvss.field, "cvss_score");
//! assert_eq!(cvss.operator, CompOp::Gte);
//! assert_eq!(cvss.value, Value::Number(9.0));
//! ```
//!
//! All three entry points are pure and never fail: malformed input degrades to
//! freetext, and unknown fields are only reported by [`validate_query`].

pub mod ast;
pub mod coerce;
pub mod config;
pub mod lexer;
pub mod parser;
pub mod schema;
pub mod sql_compiler;
pub mod suggest;
pub mod token;
pub mod validate;

pub use ast::{
    render_query, BooleanOp, CompOp, Condition, FieldCondition, FreetextCondition, Value,
    WildcardKind, WildcardPattern,
};
pub use config::{ConfigError, QueryConfig, TableMappingConfig};
pub use schema::{FieldRegistry, FieldSpec, ValueType};
pub use suggest::{Suggestion, SuggestionKind};
pub use validate::Validation;

use lexer::tokenize;
use parser::ConditionBuilder;

/// Parses a query against the built-in schema. `None` means the query is
/// empty and matches everything.
pub fn parse_query(query: &str, entity_type: Option<&str>) -> Option<Vec<Condition>> {
    parse_query_with(FieldRegistry::global(), query, entity_type)
}

pub fn parse_query_with(
    registry: &FieldRegistry,
    query: &str,
    entity_type: Option<&str>,
) -> Option<Vec<Condition>> {
    let tokens = tokenize(query);
    ConditionBuilder::new(&tokens, registry, entity_type).build()
}

/// Checks every field of `query` against `entity_type`'s schema.
pub fn validate_query(query: &str, entity_type: &str) -> Validation {
    validate::validate_with(FieldRegistry::global(), query, entity_type)
}

/// Completions for the partial token under the cursor.
pub fn get_query_suggestions(entity_type: &str, partial: &str) -> Vec<Suggestion> {
    suggest::suggest_with(FieldRegistry::global(), entity_type, partial)
}
