//! 条件构建器：把token流转换为有序的条件列表
//!
//! ## 语法
//!
//! ```text
//! query := unit ( (AND | OR)? unit )*
//! unit  := NOT? FIELD_ATOM | WORD
//! ```
//!
//! 没有优先级，也没有分组。`AND`、`OR`、`NOT` 是位置标记，由下一个产生记录的
//! 单元消费：字段条件把它们记录为 `boolean_op` / `negate`，自由文本则丢弃它们。
//! 后面没有单元的标记不产生任何记录。
//!
//! ## 降级处理
//!
//! 不会失败。无法解析的字段名保留用户输入的名字作为规范名；格式错误或只输入了
//! 运算符的单元（`cvss:>=`）在词法阶段已经是单词，成为自由文本。
//!
//! ```text
//! cvss:>=9.0 AND kev:true vendor:*cisco*
//!   -> [cvss_score gte 9.0 (AND), kev eq true (AND), vendor eq contains("cisco") (AND)]
//! ```

use tracing::{debug, trace};

use crate::ast::{BooleanOp, Condition, FieldCondition, FreetextCondition};
use crate::coerce::coerce_value;
use crate::schema::FieldRegistry;
use crate::token::{Token, TokenKind};

pub struct ConditionBuilder<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
    registry: &'a FieldRegistry,
    entity_type: Option<&'a str>,
    pending_op: BooleanOp,
    pending_negate: bool,
}

impl<'a> ConditionBuilder<'a> {
    pub fn new(
        tokens: &'a [Token<'a>],
        registry: &'a FieldRegistry,
        entity_type: Option<&'a str>,
    ) -> Self {
        Self {
            tokens,
            position: 0,
            registry,
            entity_type,
            pending_op: BooleanOp::And,
            pending_negate: false,
        }
    }

    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    /// 空token流返回 `None`，表示匹配全部
    pub fn build(mut self) -> Option<Vec<Condition>> {
        if self.tokens.is_empty() {
            return None;
        }

        let mut conditions = Vec::with_capacity(self.tokens.len());
        while let Some(token) = self.advance() {
            match &token.kind {
                TokenKind::And => self.pending_op = BooleanOp::And,
                TokenKind::Or => self.pending_op = BooleanOp::Or,
                TokenKind::Not => self.pending_negate = true,
                TokenKind::FieldAtom { field, value } => {
                    conditions.push(Condition::Field(self.field_condition(field, value)));
                }
                TokenKind::Word(word) => {
                    // 自由文本不携带 NOT / OR
                    self.reset_pending();
                    conditions.push(Condition::Freetext(FreetextCondition {
                        value: word.trim().to_string(),
                    }));
                }
            }
        }

        trace!(
            tokens = self.tokens.len(),
            conditions = conditions.len(),
            "built conditions"
        );
        Some(conditions)
    }

    fn field_condition(&mut self, typed: &str, raw_value: &str) -> FieldCondition {
        let spec = self.registry.resolve(self.entity_type, typed);
        let coerced = coerce_value(raw_value, spec.map(|s| s.value_type));
        let field = match spec {
            Some(spec) => spec.name.clone(),
            None => {
                debug!(field = typed, "unresolved field kept verbatim");
                typed.to_string()
            }
        };

        let (boolean_op, negate) = self.reset_pending();
        FieldCondition {
            field,
            original_field: typed.to_string(),
            operator: coerced.operator,
            value: coerced.value,
            negate,
            boolean_op,
        }
    }

    /// 取出待处理的标记，并恢复默认值
    fn reset_pending(&mut self) -> (BooleanOp, bool) {
        let op = std::mem::take(&mut self.pending_op);
        let negate = std::mem::take(&mut self.pending_negate);
        (op, negate)
    }
}
