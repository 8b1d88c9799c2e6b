//! Reference predicate compiler: condition list -> SQL `WHERE` using sea-query.
//!
//! Field conditions are folded left to right with each condition's
//! `boolean_op`; the first condition's operator has nothing to join and is
//! ignored. Every freetext term becomes an OR-group of `LIKE '%term%'` over the
//! entity's text columns and is AND-ed onto the result. User text inside a
//! `LIKE` pattern is escaped with `\`, so `%` and `_` match literally.

use sea_query::{
    Alias, Asterisk, Expr, Iden, LikeExpr, PostgresQueryBuilder, SelectStatement, SimpleExpr,
};
use thiserror::Error;
use tracing::trace;

use crate::ast::{escape_like, BooleanOp, CompOp, Condition, FieldCondition, Value};
use crate::config::{QueryConfig, TableMappingConfig};
use crate::schema::FieldRegistry;

/// Configuration for SQL optimization
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    /// Length of an OR-joined run of equalities on one field at which it
    /// becomes an IN clause
    pub max_or_conditions_for_in: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_or_conditions_for_in: 5,
        }
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = write!(s, "{}", self.0);
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("entity type '{0}' has no text search columns")]
    NoTextColumns(String),

    #[error("wildcard value on '{field}' cannot be compared with {operator}")]
    UnsupportedWildcardOperator { field: String, operator: &'static str },
}

/// Represents an optimization applied during compilation
#[derive(Debug, Clone, PartialEq)]
pub enum Optimization {
    OrToIn { field: String, value_count: usize },
}

/// Result of SQL compilation with optimization information
#[derive(Debug)]
pub struct CompileResult {
    pub sql: String,
    pub optimizations: Vec<Optimization>,
}

pub struct SqlCompiler<'a> {
    config: OptimizationConfig,
    registry: &'a FieldRegistry,
    tables: &'a TableMappingConfig,
}

impl<'a> SqlCompiler<'a> {
    pub fn new(registry: &'a FieldRegistry, tables: &'a TableMappingConfig) -> Self {
        Self {
            config: OptimizationConfig::default(),
            registry,
            tables,
        }
    }

    pub fn from_config(config: &'a QueryConfig) -> Self {
        Self::new(&config.registry, &config.tables)
    }

    pub fn with_optimization(mut self, config: OptimizationConfig) -> Self {
        self.config = config;
        self
    }

    /// Compiles `SELECT * FROM <table> WHERE ...` for an entity type. An empty
    /// condition list selects everything.
    pub fn compile(
        &self,
        conditions: &[Condition],
        entity_type: &str,
    ) -> Result<CompileResult, CompileError> {
        let mut optimizations = Vec::new();

        let mut select = SelectStatement::new();
        select
            .column(Asterisk)
            .from(Alias::new(self.tables.table_name(entity_type)));

        if let Some(predicate) = self.compile_where(conditions, entity_type, &mut optimizations)? {
            select.and_where(predicate);
        }

        let sql = select.to_string(PostgresQueryBuilder);
        trace!(%sql, "compiled query");
        Ok(CompileResult { sql, optimizations })
    }

    /// Builds the predicate alone, for callers assembling their own statement.
    pub fn compile_where(
        &self,
        conditions: &[Condition],
        entity_type: &str,
        optimizations: &mut Vec<Optimization>,
    ) -> Result<Option<SimpleExpr>, CompileError> {
        let fields: Vec<&FieldCondition> =
            conditions.iter().filter_map(Condition::as_field).collect();

        let mut combined: Option<SimpleExpr> = None;
        let mut i = 0;
        while i < fields.len() {
            let condition = fields[i];
            let joins_by_or = combined.is_none() || condition.boolean_op == BooleanOp::Or;
            let run = if joins_by_or { equality_run(&fields[i..]) } else { 1 };

            let (expr, consumed) = if run > 1 && run >= self.config.max_or_conditions_for_in {
                optimizations.push(Optimization::OrToIn {
                    field: condition.field.clone(),
                    value_count: run,
                });
                let values = fields[i..i + run].iter().map(|c| scalar_value(&c.value));
                (Expr::col(ColumnName(condition.field.clone())).is_in(values), run)
            } else {
                (self.compile_field(condition)?, 1)
            };

            combined = Some(match combined {
                None => expr,
                Some(prev) => match condition.boolean_op {
                    BooleanOp::And => prev.and(expr),
                    BooleanOp::Or => prev.or(expr),
                },
            });
            i += consumed;
        }

        for condition in conditions {
            if let Condition::Freetext(text) = condition {
                let group = self.compile_freetext(&text.value, entity_type)?;
                combined = Some(match combined {
                    None => group,
                    Some(prev) => prev.and(group),
                });
            }
        }

        Ok(combined)
    }

    fn compile_field(&self, condition: &FieldCondition) -> Result<SimpleExpr, CompileError> {
        let col = Expr::col(ColumnName(condition.field.clone()));

        let expr = match &condition.value {
            Value::Wildcard(pattern) => match condition.operator {
                CompOp::Eq => col.like(escaped_like(pattern.like_pattern())),
                CompOp::Neq => col.not_like(escaped_like(pattern.like_pattern())),
                op => {
                    return Err(CompileError::UnsupportedWildcardOperator {
                        field: condition.field.clone(),
                        operator: op.as_str(),
                    })
                }
            },
            value => {
                let val = scalar_value(value);
                match condition.operator {
                    CompOp::Eq => col.eq(val),
                    CompOp::Neq => col.ne(val),
                    CompOp::Gt => col.gt(val),
                    CompOp::Gte => col.gte(val),
                    CompOp::Lt => col.lt(val),
                    CompOp::Lte => col.lte(val),
                }
            }
        };

        Ok(if condition.negate { expr.not() } else { expr })
    }

    fn compile_freetext(&self, term: &str, entity_type: &str) -> Result<SimpleExpr, CompileError> {
        let schema = self
            .registry
            .entity(entity_type)
            .ok_or_else(|| CompileError::UnknownEntity(entity_type.to_string()))?;

        let pattern = format!("%{}%", escape_like(term));
        schema
            .text_columns()
            .iter()
            .map(|column| {
                Expr::col(ColumnName(column.clone())).like(escaped_like(pattern.clone()))
            })
            .reduce(|acc, expr| acc.or(expr))
            .ok_or_else(|| CompileError::NoTextColumns(entity_type.to_string()))
    }
}

fn escaped_like(pattern: String) -> LikeExpr {
    LikeExpr::new(pattern).escape('\\')
}

/// Length of the run at the head of `fields` that can collapse into one IN:
/// plain equalities on the same field, joined by OR.
fn equality_run(fields: &[&FieldCondition]) -> usize {
    let Some(first) = fields.first() else {
        return 0;
    };
    if !is_plain_equality(first) {
        return 1;
    }
    1 + fields[1..]
        .iter()
        .take_while(|c| {
            c.boolean_op == BooleanOp::Or && c.field == first.field && is_plain_equality(c)
        })
        .count()
}

fn is_plain_equality(c: &FieldCondition) -> bool {
    c.operator == CompOp::Eq && !c.negate && !matches!(c.value, Value::Wildcard(_))
}

/// Convert a non-wildcard condition value to a sea-query value
fn scalar_value(value: &Value) -> sea_query::Value {
    match value {
        Value::Bool(b) => sea_query::Value::Bool(Some(*b)),
        Value::Number(n) => sea_query::Value::Double(Some(*n)),
        Value::Date(s) | Value::String(s) => sea_query::Value::String(Some(Box::new(s.clone()))),
        Value::Wildcard(w) => sea_query::Value::String(Some(Box::new(w.value.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::ConditionBuilder;
    use std::collections::HashMap;

    fn conditions(query: &str, entity_type: &str) -> Vec<Condition> {
        let tokens = tokenize(query);
        ConditionBuilder::new(&tokens, FieldRegistry::global(), Some(entity_type))
            .build()
            .unwrap_or_default()
    }

    fn compile(query: &str, entity_type: &str) -> Result<CompileResult, CompileError> {
        let tables = TableMappingConfig::default();
        let compiler = SqlCompiler::new(FieldRegistry::global(), &tables);
        compiler.compile(&conditions(query, entity_type), entity_type)
    }

    #[test]
    fn test_simple_condition() {
        let result = compile("type:ip", "iocs").unwrap();
        assert!(result.sql.contains(r#"FROM "iocs""#));
        assert!(result.sql.contains(r#""type" = 'ip'"#));
        assert!(result.optimizations.is_empty());
    }

    #[test]
    fn test_empty_query_selects_everything() {
        let result = compile("", "iocs").unwrap();
        assert_eq!(result.sql, r#"SELECT * FROM "iocs""#);
    }

    #[test]
    fn test_table_mapping() {
        let mut mappings = HashMap::new();
        mappings.insert("iocs".to_string(), "threat_iocs".to_string());
        let tables = TableMappingConfig { mappings };
        let compiler = SqlCompiler::new(FieldRegistry::global(), &tables);

        let result = compiler.compile(&conditions("type:ip", "iocs"), "iocs").unwrap();
        assert!(result.sql.contains(r#"FROM "threat_iocs""#));
    }

    #[test]
    fn test_range_and_negation() {
        let result = compile("cvss:>=9.0 NOT kev:true", "vulnerabilities").unwrap();
        assert!(result.sql.contains(r#""cvss_score" >= 9"#));
        assert!(result.sql.contains("NOT"));
        assert!(result.sql.contains(r#""kev" = "#));
    }

    #[test]
    fn test_wildcards_become_like() {
        let result = compile("vendor:*cisco* !product:ios*", "vulnerabilities").unwrap();
        assert!(result.sql.contains(r#""vendor" LIKE '%cisco%'"#));
        assert!(result.sql.contains(r#""product" NOT LIKE 'ios%'"#));
    }

    #[test]
    fn test_wildcard_with_range_is_rejected() {
        let result = compile("vendor:>cis*", "vulnerabilities");
        assert_eq!(
            result.unwrap_err(),
            CompileError::UnsupportedWildcardOperator {
                field: "vendor".to_string(),
                operator: "gt"
            }
        );
    }

    #[test]
    fn test_freetext_searches_text_columns() {
        let result = compile("lockbit", "actors").unwrap();
        assert!(result.sql.contains(r#""name" LIKE '%lockbit%'"#));
        assert!(result.sql.contains(r#""aliases" LIKE '%lockbit%'"#));
        assert!(result.sql.contains(r#""description" LIKE '%lockbit%'"#));
        assert!(result.sql.contains(" OR "));
    }

    #[test]
    fn test_like_metacharacters_match_literally() {
        let result = compile("100%", "iocs").unwrap();
        assert!(!result.sql.contains("'%100%%'"));
        assert!(result.sql.contains("ESCAPE"));

        let result = compile("vendor:*50%_off*", "vulnerabilities").unwrap();
        assert!(!result.sql.contains("'%50%_off%'"));
        assert!(result.sql.contains("ESCAPE"));
    }

    #[test]
    fn test_freetext_on_unknown_entity() {
        let tables = TableMappingConfig::default();
        let compiler = SqlCompiler::new(FieldRegistry::global(), &tables);
        let result = compiler.compile(&conditions("lockbit", "iocs"), "campaigns");
        assert_eq!(
            result.unwrap_err(),
            CompileError::UnknownEntity("campaigns".to_string())
        );
    }

    #[test]
    fn test_or_to_in_optimization() {
        let tables = TableMappingConfig::default();
        let compiler = SqlCompiler::new(FieldRegistry::global(), &tables)
            .with_optimization(OptimizationConfig {
                max_or_conditions_for_in: 2,
            });

        let result = compiler
            .compile(&conditions("type:ip OR type:domain OR type:url", "iocs"), "iocs")
            .unwrap();
        assert_eq!(
            result.optimizations,
            vec![Optimization::OrToIn {
                field: "type".to_string(),
                value_count: 3
            }]
        );
        assert!(result.sql.contains(r#""type" IN ('ip', 'domain', 'url')"#));
    }

    #[test]
    fn test_and_joined_run_is_not_collapsed() {
        let tables = TableMappingConfig::default();
        let compiler = SqlCompiler::new(FieldRegistry::global(), &tables)
            .with_optimization(OptimizationConfig {
                max_or_conditions_for_in: 2,
            });

        let result = compiler
            .compile(&conditions("severity:high type:ip OR type:domain", "iocs"), "iocs")
            .unwrap();
        assert!(result.optimizations.is_empty());
        assert!(!result.sql.contains(" IN "));
    }

    #[test]
    fn test_below_threshold_keeps_or() {
        let result = compile("type:ip OR type:domain", "iocs").unwrap();
        assert!(result.optimizations.is_empty());
        assert!(result.sql.contains(r#""type" = 'ip'"#));
        assert!(result.sql.contains(r#" OR "type" = 'domain'"#));
    }
}
