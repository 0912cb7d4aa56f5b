//! Operand resolution.
//!
//! Turns one operand token into bytes. Literals, variables and loop
//! elements are borrowed; only escaped quotes, negative literals and
//! file records fetched by index are owned.

use std::borrow::Cow;

use crate::error::ErrorKind;
use crate::lexer::Lexer;
use crate::reader;
use crate::registry::{Binding, Registry};
use crate::stack::{LoopStack, Segment};
use crate::token::{ArithOp, Token, TokenKind};

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn unexpected(expected: &'static str, found: &Token<'_>) -> ErrorKind {
    ErrorKind::UnexpectedToken {
        expected,
        found: found.display(),
    }
}

/// Read-only view of interpreter state used to evaluate operands.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'r> {
    registry: &'r Registry,
    loops: &'r LoopStack,
    chunk_size: usize,
}

impl<'r> Resolver<'r> {
    #[must_use]
    pub const fn new(registry: &'r Registry, loops: &'r LoopStack, chunk_size: usize) -> Self {
        Self {
            registry,
            loops,
            chunk_size,
        }
    }

    /// Value of the operand starting at `token`. A `[index]` directly
    /// after a segment name is consumed from `lexer`.
    pub fn resolve<'a: 'r>(
        &self,
        token: Token<'a>,
        lexer: &mut Lexer<'a>,
    ) -> Result<Cow<'r, [u8]>, ErrorKind> {
        match token.kind {
            TokenKind::Quote | TokenKind::Number => Ok(token.text),
            TokenKind::Arith(ArithOp::Sub) => {
                let number = lexer.next_token()?;
                if number.kind != TokenKind::Number {
                    return Err(unexpected("a number after '-'", &number));
                }
                let mut negative = Vec::with_capacity(number.text.len() + 1);
                negative.push(b'-');
                negative.extend_from_slice(&number.text);
                Ok(Cow::Owned(negative))
            }
            TokenKind::Variable if *token.text == *b"$" => self
                .loops
                .current()
                .map(Cow::Borrowed)
                .ok_or_else(|| ErrorKind::NoOpenSegment("$".to_string())),
            TokenKind::Variable => self.resolve_name(&token.text, lexer),
            _ => Err(unexpected("a value", &token)),
        }
    }

    fn resolve_name(&self, name: &[u8], lexer: &mut Lexer<'_>) -> Result<Cow<'r, [u8]>, ErrorKind> {
        let binding = self.registry.resolve(name)?;
        let Some(index) = self.index(lexer)? else {
            return match binding {
                Binding::Variable(slot) => Ok(Cow::Borrowed(self.registry.value(slot))),
                Binding::File(slot) => self.open_element(Segment::File(slot), name),
                Binding::Field(slot) => self.open_element(Segment::Field(slot), name),
            };
        };

        match binding {
            Binding::Variable(_) => Err(ErrorKind::IndexingNonSegment(lossy(name))),
            Binding::Field(slot) => self
                .loops
                .field_of_current(self.registry, slot, index)
                .map(Cow::Borrowed),
            Binding::File(slot) => {
                let file = self.registry.file(slot);
                let mut source = &file.source;
                let mut record = Vec::new();
                let found = reader::load_record(
                    &mut record,
                    &mut source,
                    &file.delimiter,
                    index,
                    self.chunk_size,
                )?;
                if found {
                    Ok(Cow::Owned(record))
                } else {
                    Err(ErrorKind::OutOfRange {
                        segment: lossy(name),
                        index,
                    })
                }
            }
        }
    }

    fn open_element(&self, segment: Segment, name: &[u8]) -> Result<Cow<'r, [u8]>, ErrorKind> {
        self.loops
            .current_of(segment)
            .map(Cow::Borrowed)
            .ok_or_else(|| ErrorKind::NoOpenSegment(lossy(name)))
    }

    /// Parse a `[index]` suffix if one follows immediately.
    pub fn index(&self, lexer: &mut Lexer<'_>) -> Result<Option<usize>, ErrorKind> {
        if lexer.peek_byte() != Some(b'[') {
            return Ok(None);
        }
        lexer.next_token()?;
        let operand = lexer.next_token()?;
        let index = self.index_value(&operand)?;
        let close = lexer.next_token()?;
        if close.kind != TokenKind::CloseBracket {
            return Err(unexpected("']'", &close));
        }
        Ok(Some(index))
    }

    /// A non-negative integer from a number literal or a variable.
    pub fn index_value(&self, token: &Token<'_>) -> Result<usize, ErrorKind> {
        let text = match token.kind {
            TokenKind::Number => &*token.text,
            TokenKind::Variable => self.registry.variable(&token.text)?,
            _ => return Err(unexpected("an index", token)),
        };
        parse_index(text).ok_or_else(|| ErrorKind::NotANumber(lossy(text)))
    }
}

fn parse_index(text: &[u8]) -> Option<usize> {
    if text.is_empty() || !text.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(text).ok()?.parse().ok()
}
