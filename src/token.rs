use std::borrow::Cow;

/// Byte range of a token inside its statement text.
///
/// `start` is the first content byte and `stop` is one past the last.
/// Quote spans exclude the surrounding quote characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub stop: usize,
}

/// Comparison operators usable in `if`/`elif` conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Single-byte arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'+' => Some(Self::Add),
            b'-' => Some(Self::Sub),
            b'*' => Some(Self::Mul),
            b'/' => Some(Self::Div),
            b'%' => Some(Self::Rem),
            _ => None,
        }
    }

    /// `*`, `/` and `%` bind tighter than `+` and `-`.
    #[must_use]
    pub const fn is_multiplicative(self) -> bool {
        matches!(self, Self::Mul | Self::Div | Self::Rem)
    }

    #[must_use]
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => lhs / rhs,
            Self::Rem => lhs % rhs,
        }
    }
}

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// End of statement: end of line, `;`, NUL or a `#` comment.
    Terminator,
    /// Quoted text (`'...'`, `"..."` or `` `...` ``), escapes decoded.
    Quote,
    /// Identifier-like word: keyword, variable or segment name, `$`.
    Variable,
    /// Numeric literal (ASCII digits, at most one decimal point).
    Number,
    /// `,`
    Comma,
    /// Bare `=`.
    Assign,
    /// One of `== != < <= > >=`.
    Comparator(Comparator),
    /// One of `+ - * / %`.
    Arith(ArithOp),
    /// `[`
    OpenBracket,
    /// `]`
    CloseBracket,
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
    /// `.`, chains another `in` clause.
    Dot,
}

/// A single token with its kind, decoded text, and span.
///
/// `text` borrows from the statement unless escape sequences had to be
/// decoded, in which case it owns the decoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: Cow<'a, [u8]>,
    pub span: Span,
}

impl Token<'_> {
    /// True for an identifier token spelled exactly `word`.
    #[must_use]
    pub fn is_word(&self, word: &[u8]) -> bool {
        self.kind == TokenKind::Variable && *self.text == *word
    }

    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.kind == TokenKind::Terminator
    }

    /// Lossy display form for diagnostics.
    #[must_use]
    pub fn display(&self) -> String {
        if self.is_terminator() {
            "end of statement".to_string()
        } else {
            String::from_utf8_lossy(&self.text).into_owned()
        }
    }
}
