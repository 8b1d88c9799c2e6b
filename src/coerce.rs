//! 值转换：把 `field:` 之后的原始文本转换为运算符和带类型的 [`Value`]
//!
//! 优先级（先匹配者生效）：
//!
//! 1. 运算符前缀 `>=`、`<=`、`>`、`<`、`!`（最先剥离）
//! 2. 引号包围的值按字面处理，并强制为 `eq`
//! 3. `true` / `false`
//! 4. 数字（`-1`、`9.0`）
//! 5. 日期，仅限 `date` 字段，且 `!` 下不转换
//! 6. 前导/尾随 `*` 通配符
//! 7. 普通字符串

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::ast::{CompOp, Value, WildcardKind, WildcardPattern};
use crate::schema::ValueType;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+(?:\.\d+)?$").expect("number pattern is valid"));

static DATE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("date pattern is valid"));

/// 输出的时间戳格式，例如 `2024-01-01T00:00:00.000Z`
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// `YYYY-MM-DD` 之后可接受的本地时间格式，按UTC处理
const DATE_TIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub operator: CompOp,
    pub value: Value,
}

/// True for the numeric literals the coercer turns into numbers.
pub fn is_number(s: &str) -> bool {
    NUMBER.is_match(s)
}

/// True when `s` starts like a `YYYY-MM-DD` date.
pub fn looks_like_date(s: &str) -> bool {
    DATE_PREFIX.is_match(s)
}

/// Splits a leading operator off `raw`. No prefix means `eq`.
pub fn split_operator(raw: &str) -> (CompOp, &str) {
    const PREFIXES: [(&str, CompOp); 5] = [
        (">=", CompOp::Gte),
        ("<=", CompOp::Lte),
        (">", CompOp::Gt),
        ("<", CompOp::Lt),
        ("!", CompOp::Neq),
    ];
    PREFIXES
        .iter()
        .find_map(|(prefix, op)| raw.strip_prefix(prefix).map(|rest| (*op, rest)))
        .unwrap_or((CompOp::Eq, raw))
}

/// Coerces a raw value for a field of the given declared type, if known.
pub fn coerce_value(raw: &str, value_type: Option<ValueType>) -> Coerced {
    let (operator, rest) = split_operator(raw);

    if let Some(inner) = unquote(rest) {
        return Coerced {
            operator: CompOp::Eq,
            value: Value::String(inner.to_string()),
        };
    }

    let value = match rest {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ if is_number(rest) => match rest.parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::String(rest.to_string()),
        },
        _ => {
            let date = match (value_type, operator) {
                (Some(ValueType::Date), op) if op != CompOp::Neq => parse_date(rest),
                _ => None,
            };
            match date {
                Some(iso) => Value::Date(iso),
                None => wildcard(rest)
                    .map(Value::Wildcard)
                    .unwrap_or_else(|| Value::String(rest.to_string())),
            }
        }
    };

    if operator.is_range() && matches!(value, Value::String(_)) {
        debug!(value = rest, operator = operator.as_str(), "range comparison on a plain string");
    }

    Coerced { operator, value }
}

fn unquote(s: &str) -> Option<&str> {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        Some(&s[1..s.len() - 1])
    } else {
        None
    }
}

fn wildcard(s: &str) -> Option<WildcardPattern> {
    let leading = s.strip_prefix('*');
    let trailing = s.strip_suffix('*');
    match (leading, trailing) {
        // 单独的 "*" 既是前导也是尾随
        _ if s == "*" => Some(WildcardPattern::new(WildcardKind::Contains, "")),
        (Some(rest), Some(_)) => Some(WildcardPattern::new(
            WildcardKind::Contains,
            rest.strip_suffix('*').unwrap_or(rest),
        )),
        (None, Some(rest)) => Some(WildcardPattern::new(WildcardKind::StartsWith, rest)),
        (Some(rest), None) => Some(WildcardPattern::new(WildcardKind::EndsWith, rest)),
        (None, None) => None,
    }
}

/// 把 `YYYY-MM-DD`（可带时间）解析为ISO-8601 UTC时间戳
/// 只有日期时取UTC零点
pub fn parse_date(s: &str) -> Option<String> {
    if !looks_like_date(s) {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(iso);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(iso(dt.with_timezone(&Utc).naive_utc()));
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(iso)
}

fn iso(dt: NaiveDateTime) -> String {
    dt.format(ISO_FORMAT).to_string()
}
