//! 解析后查询的结构化表示
//!
//! 查询被解析为扁平、有序的 [`Condition`] 列表。该列表是交给后端过滤器构建方的
//! 契约，序列化后的JSON结构供前端使用：
//!
//! ```json
//! {"kind":"condition","field":"name","originalField":"actor","operator":"eq",
//!  "value":"lockbit","negate":false,"booleanOp":"AND"}
//! ```

use std::fmt;

use serde::Serialize;

use crate::coerce::{is_number, looks_like_date};

/// 查询中的一个单元，按从左到右的出现顺序排列
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Condition {
    /// `field:value`，已根据字段schema解析
    #[serde(rename = "condition")]
    Field(FieldCondition),
    /// 裸关键字，在实体的文本列中搜索
    #[serde(rename = "freetext")]
    Freetext(FreetextCondition),
}

impl Condition {
    pub fn as_field(&self) -> Option<&FieldCondition> {
        match self {
            Condition::Field(c) => Some(c),
            Condition::Freetext(_) => None,
        }
    }

    pub fn is_freetext(&self) -> bool {
        matches!(self, Condition::Freetext(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCondition {
    /// 规范字段名；无法解析时为用户输入的名字
    pub field: String,
    /// 用户在冒号前输入的原始内容
    pub original_field: String,
    pub operator: CompOp,
    pub value: Value,
    pub negate: bool,
    /// 与前一个条件的连接方式。查询的第一个条件没有前驱，同样为 `And`
    pub boolean_op: BooleanOp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreetextCondition {
    pub value: String,
}

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompOp {
    #[default]
    Eq,  // (no prefix)
    Neq, // !
    Gt,  // >
    Gte, // >=
    Lt,  // <
    Lte, // <=
}

impl CompOp {
    /// 写在值前面、用于选择该运算符的前缀
    pub fn prefix(self) -> &'static str {
        match self {
            CompOp::Eq => "",
            CompOp::Neq => "!",
            CompOp::Gt => ">",
            CompOp::Gte => ">=",
            CompOp::Lt => "<",
            CompOp::Lte => "<=",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompOp::Eq => "eq",
            CompOp::Neq => "neq",
            CompOp::Gt => "gt",
            CompOp::Gte => "gte",
            CompOp::Lt => "lt",
            CompOp::Lte => "lte",
        }
    }

    pub fn is_range(self) -> bool {
        matches!(self, CompOp::Gt | CompOp::Gte | CompOp::Lt | CompOp::Lte)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BooleanOp {
    #[default]
    And,
    Or,
}

/// 带类型的条件值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    /// ISO-8601 时间戳，例如 `2024-01-01T00:00:00.000Z`
    Date(String),
    String(String),
    Wildcard(WildcardPattern),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WildcardPattern {
    pub kind: WildcardKind,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WildcardKind {
    Contains,   // *x*
    StartsWith, // x*
    EndsWith,   // *x
}

impl WildcardPattern {
    pub fn new(kind: WildcardKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// 等价的SQL `LIKE` 模式，值中的 `%`、`_`、`\` 以 `\` 转义
    pub fn like_pattern(&self) -> String {
        let value = escape_like(&self.value);
        match self.kind {
            WildcardKind::Contains => format!("%{}%", value),
            WildcardKind::StartsWith => format!("{}%", value),
            WildcardKind::EndsWith => format!("%{}", value),
        }
    }
}

/// 转义 `LIKE` 元字符，转义符为 `\`
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// 普通字符串需要加引号才能被读回为同一个字符串时返回true
fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s == "true"
        || s == "false"
        || s.chars().any(char::is_whitespace)
        || s.starts_with(['*', '!', '<', '>', '"'])
        || s.ends_with('*')
        || is_number(s)
        || looks_like_date(s)
}

impl fmt::Display for WildcardPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WildcardKind::Contains => write!(f, "*{}*", self.value),
            WildcardKind::StartsWith => write!(f, "{}*", self.value),
            WildcardKind::EndsWith => write!(f, "*{}", self.value),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Date(d) => f.write_str(d),
            Value::String(s) if needs_quotes(s) => write!(f, "\"{s}\""),
            Value::String(s) => f.write_str(s),
            Value::Wildcard(w) => write!(f, "{w}"),
        }
    }
}

impl fmt::Display for FieldCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            f.write_str("NOT ")?;
        }
        write!(f, "{}:{}", self.original_field, self.operator.prefix())?;
        match &self.value {
            // 引号会把运算符重置为 eq，非 eq 的字符串原样输出
            Value::String(s) if self.operator != CompOp::Eq => f.write_str(s),
            value => write!(f, "{value}"),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Field(c) => write!(f, "{c}"),
            Condition::Freetext(t) => f.write_str(&t.value),
        }
    }
}

/// 把条件列表渲染回查询文本。单元之间默认是 `AND`，所以只输出 `OR`
pub fn render_query(conditions: &[Condition]) -> String {
    let mut out = String::new();
    for (i, condition) in conditions.iter().enumerate() {
        if i > 0 {
            out.push(' ');
            if let Condition::Field(FieldCondition {
                boolean_op: BooleanOp::Or,
                ..
            }) = condition
            {
                out.push_str("OR ");
            }
        }
        out.push_str(&condition.to_string());
    }
    out
}
