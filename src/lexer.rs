use std::borrow::Cow;
use std::fmt;

use crate::token::{ArithOp, Comparator, Span, Token, TokenKind};

/// Classifies a lexer error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    /// Backslash followed by a byte with no escape meaning.
    UnrecognizedEscapeSequence(u8),
    /// Quote opened with the given character and never closed.
    UnterminatedQuote(u8),
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedEscapeSequence(byte) => {
                write!(f, "unrecognised escape sequence '\\{}'", byte.escape_ascii())
            }
            Self::UnterminatedQuote(quote) => {
                write!(f, "unterminated quote, expected closing {}", quote.escape_ascii())
            }
        }
    }
}

/// Error produced while tokenizing a statement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at column {column}")]
pub struct LexError {
    pub kind: LexErrorKind,
    /// 1-based byte column inside the statement.
    pub column: usize,
}

/// Tokenize one statement, up to and including its terminator.
///
/// # Errors
///
/// Returns `LexError` on unterminated quotes or unknown escapes.
pub fn tokenize(input: &[u8]) -> Result<Vec<Token<'_>>, LexError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.is_terminator();
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

const fn is_blank(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}

const fn ends_word(byte: u8) -> bool {
    matches!(
        byte,
        b' ' | b'\t'
            | b'\n'
            | b'\r'
            | 0
            | b';'
            | b','
            | b'('
            | b')'
            | b'['
            | b']'
            | b'.'
            | b'='
    )
}

const fn unescape(byte: u8) -> Option<u8> {
    match byte {
        b'n' => Some(b'\n'),
        b't' => Some(b'\t'),
        b'\\' | b'\'' | b'"' | b'`' => Some(byte),
        _ => None,
    }
}

/// Incremental tokenizer over a single statement.
///
/// Each call to [`Lexer::next_token`] continues where the previous
/// token ended. Once the terminator is reached it is returned again on
/// every further call.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Resume scanning `input` at `pos`, e.g. just past a keyword.
    #[must_use]
    pub const fn starting_at(input: &'a [u8], pos: usize) -> Self {
        Self { input, pos }
    }

    /// Offset just past the last token returned.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// The byte immediately after the last token, without skipping
    /// whitespace. Used to spot `name[` segment indexing.
    #[must_use]
    pub fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    pub fn peek_token(&self) -> Result<Token<'a>, LexError> {
        self.clone().next_token()
    }

    pub fn next_token(&mut self) -> Result<Token<'a>, LexError> {
        while self.peek_byte().is_some_and(is_blank) {
            self.pos += 1;
        }

        let Some(ch) = self.peek_byte() else {
            return Ok(self.terminator());
        };

        let token = match ch {
            b'\n' | b'\r' | b';' | b'#' | 0 => self.terminator(),
            b',' => self.operator(TokenKind::Comma, 1),
            b'[' => self.operator(TokenKind::OpenBracket, 1),
            b']' => self.operator(TokenKind::CloseBracket, 1),
            b'(' => self.operator(TokenKind::OpenParen, 1),
            b')' => self.operator(TokenKind::CloseParen, 1),
            b'.' => self.operator(TokenKind::Dot, 1),
            b'=' if self.peek_at(1) == Some(b'=') => {
                self.operator(TokenKind::Comparator(Comparator::Eq), 2)
            }
            b'=' => self.operator(TokenKind::Assign, 1),
            b'!' if self.peek_at(1) == Some(b'=') => {
                self.operator(TokenKind::Comparator(Comparator::Ne), 2)
            }
            b'<' if self.peek_at(1) == Some(b'=') => {
                self.operator(TokenKind::Comparator(Comparator::Le), 2)
            }
            b'<' => self.operator(TokenKind::Comparator(Comparator::Lt), 1),
            b'>' if self.peek_at(1) == Some(b'=') => {
                self.operator(TokenKind::Comparator(Comparator::Ge), 2)
            }
            b'>' => self.operator(TokenKind::Comparator(Comparator::Gt), 1),
            b'\'' | b'"' | b'`' => self.read_quote(ch)?,
            b'0'..=b'9' => self.read_number(),
            _ => match ArithOp::from_byte(ch) {
                Some(op) => self.operator(TokenKind::Arith(op), 1),
                None => self.read_word(),
            },
        };

        Ok(token)
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    const fn error(kind: LexErrorKind, at: usize) -> LexError {
        LexError {
            kind,
            column: at + 1,
        }
    }

    // Does not advance: the terminator stays put for later calls.
    fn terminator(&self) -> Token<'a> {
        Token {
            kind: TokenKind::Terminator,
            text: Cow::Borrowed(&self.input[self.pos..self.pos]),
            span: Span {
                start: self.pos,
                stop: self.pos,
            },
        }
    }

    fn operator(&mut self, kind: TokenKind, len: usize) -> Token<'a> {
        let start = self.pos;
        self.pos += len;
        self.slice(kind, start, self.pos)
    }

    fn slice(&self, kind: TokenKind, start: usize, stop: usize) -> Token<'a> {
        Token {
            kind,
            text: Cow::Borrowed(&self.input[start..stop]),
            span: Span { start, stop },
        }
    }

    // Runs to the next separator like a word. A dot only belongs to the
    // number when a digit follows, so `in rows[2]. in cols` still chains.
    fn read_number(&mut self) -> Token<'a> {
        let start = self.pos;
        loop {
            while self.peek_byte().is_some_and(|b| !ends_word(b)) {
                self.pos += 1;
            }
            if self.peek_byte() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.slice(TokenKind::Number, start, self.pos)
    }

    fn read_word(&mut self) -> Token<'a> {
        let start = self.pos;
        self.pos += 1;
        while self.peek_byte().is_some_and(|b| !ends_word(b)) {
            self.pos += 1;
        }
        self.slice(TokenKind::Variable, start, self.pos)
    }

    fn read_quote(&mut self, quote: u8) -> Result<Token<'a>, LexError> {
        let input = self.input;
        let open = self.pos;
        let start = open + 1;
        let mut decoded: Option<Vec<u8>> = None;
        let mut i = start;

        loop {
            let Some(&byte) = input.get(i) else {
                return Err(Self::error(LexErrorKind::UnterminatedQuote(quote), open));
            };
            if byte == quote {
                break;
            }
            if byte == b'\\' {
                let Some(&escaped) = input.get(i + 1) else {
                    return Err(Self::error(LexErrorKind::UnterminatedQuote(quote), open));
                };
                let value = unescape(escaped).ok_or_else(|| {
                    Self::error(LexErrorKind::UnrecognizedEscapeSequence(escaped), i)
                })?;
                decoded
                    .get_or_insert_with(|| input[start..i].to_vec())
                    .push(value);
                i += 2;
            } else {
                if let Some(buf) = decoded.as_mut() {
                    buf.push(byte);
                }
                i += 1;
            }
        }

        self.pos = i + 1;
        let text = decoded.map_or_else(|| Cow::Borrowed(&input[start..i]), Cow::Owned);

        Ok(Token {
            kind: TokenKind::Quote,
            text,
            span: Span { start, stop: i },
        })
    }
}
