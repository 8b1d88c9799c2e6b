//! 查询语言的词法分析器
//!
//! 按空白切分，但双引号内的空白不切分，所以 `victim:"Acme Corporation"`
//! 仍是一个单元。不会失败：任何输入都会得到某个token序列。

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::coerce::split_operator;
use crate::token::{Span, Token, TokenKind};

/// `<字段>:<值>`，值非空。`(?s)` 让引号内的值可以包含空白
static FIELD_ATOM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_.]*):(.+)$").expect("field atom pattern is valid")
});

pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    /// 返回当前位置的字符，不推进位置
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// 推进位置一个字符并返回该字符
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    /// 跳过空白字符
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// 读取到下一个引号外的空白为止
    /// 注意：未闭合的引号一直读到输入末尾
    fn read_unit(&mut self, start: usize) -> Span {
        let mut in_quotes = false;
        while let Some(c) = self.peek() {
            if c == '"' {
                in_quotes = !in_quotes;
            } else if c.is_whitespace() && !in_quotes {
                break;
            }
            self.bump();
        }
        Span::new(start, self.position)
    }
}

/// 对单个单元分类。关键字区分大小写：`and` 是普通单词
fn classify(unit: &str) -> TokenKind<'_> {
    match unit {
        "AND" => TokenKind::And,
        "OR" => TokenKind::Or,
        "NOT" => TokenKind::Not,
        _ => field_atom(unit).unwrap_or_else(|| {
            if unit.contains(':') {
                debug!(unit, "malformed field atom treated as freetext");
            }
            TokenKind::Word(unit)
        }),
    }
}

fn field_atom(unit: &str) -> Option<TokenKind<'_>> {
    let caps = FIELD_ATOM.captures(unit)?;
    let (field, value) = (caps.get(1)?, caps.get(2)?);

    // 只输入了运算符（如 `cvss:>=`），值还没输入
    if split_operator(value.as_str()).1.is_empty() {
        return None;
    }

    Some(TokenKind::FieldAtom {
        field: field.as_str(),
        value: value.as_str(),
    })
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;
        self.peek()?; // 到达输入末尾

        let span = self.read_unit(start);
        let kind = classify(span.slice(self.input));
        Some(Token { kind, span })
    }
}

/// 收集 `input` 的全部token
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input).collect()
}
