//! The token definition for the search query language.

/// A token is a single whitespace-delimited unit of a query, with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Keywords (uppercase only)
    And, // "AND"
    Or,  // "OR"
    Not, // "NOT"

    /// `field:value`, the value still carrying any operator prefix and quotes.
    FieldAtom { field: &'a str, value: &'a str },

    /// Anything else, kept verbatim.
    Word(&'a str),
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn slice<'a>(&self, input: &'a str) -> &'a str {
        &input[self.start..self.end]
    }
}
