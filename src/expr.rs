//! Expression evaluation straight off the token stream.
//!
//! ```text
//! concat     = arith ( [","] arith )*
//! arith      = operand ( OP operand )*        OP: * / % bind tighter than + -
//! condition  = comparison ( ("and" | "or") comparison )*
//! comparison = arith [ (CMP | "inc") arith ]
//! ```

use std::cmp::Ordering;

use crate::error::ErrorKind;
use crate::lexer::Lexer;
use crate::resolve::Resolver;
use crate::token::{ArithOp, Comparator, TokenKind};

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Parse a decimal number: optional sign, ASCII digits, at most one
/// decimal point.
#[must_use]
pub fn parse_number(text: &[u8]) -> Option<f64> {
    let digits = match text.first() {
        Some(b'-' | b'+') => &text[1..],
        _ => text,
    };
    let mut seen_digit = false;
    let mut seen_point = false;
    for &byte in digits {
        match byte {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_point => seen_point = true,
            _ => return None,
        }
    }
    if !seen_digit {
        return None;
    }
    std::str::from_utf8(text).ok()?.parse().ok()
}

#[must_use]
pub fn format_number(value: f64) -> Vec<u8> {
    value.to_string().into_bytes()
}

/// Like [`parse_number`], failing with `NotANumber`.
pub fn number(text: &[u8]) -> Result<f64, ErrorKind> {
    parse_number(text).ok_or_else(|| ErrorKind::NotANumber(lossy(text)))
}

/// Evaluate items up to the end of the statement, concatenating them.
pub fn eval_concat(resolver: &Resolver<'_>, lexer: &mut Lexer<'_>) -> Result<Vec<u8>, ErrorKind> {
    let mut out = Vec::new();
    loop {
        match lexer.peek_token()?.kind {
            TokenKind::Terminator => return Ok(out),
            TokenKind::Comma => {
                lexer.next_token()?;
            }
            _ => eval_arith(resolver, lexer, &mut out)?,
        }
    }
}

fn operand_number(resolver: &Resolver<'_>, lexer: &mut Lexer<'_>) -> Result<f64, ErrorKind> {
    let token = lexer.next_token()?;
    number(&resolver.resolve(token, lexer)?)
}

fn peek_op(lexer: &Lexer<'_>) -> Result<Option<ArithOp>, ErrorKind> {
    match lexer.peek_token()?.kind {
        TokenKind::Arith(op) => Ok(Some(op)),
        _ => Ok(None),
    }
}

/// Evaluate one operand, or an arithmetic run of operands, appending the
/// result to `out`. A lone operand is copied verbatim; any operator
/// makes the whole run numeric.
pub fn eval_arith(
    resolver: &Resolver<'_>,
    lexer: &mut Lexer<'_>,
    out: &mut Vec<u8>,
) -> Result<(), ErrorKind> {
    let token = lexer.next_token()?;
    let first = resolver.resolve(token, lexer)?;
    if peek_op(lexer)?.is_none() {
        out.extend_from_slice(&first);
        return Ok(());
    }

    let mut sum = 0.0;
    let mut pending = ArithOp::Add;
    let mut term = number(&first)?;
    while let Some(op) = peek_op(lexer)? {
        lexer.next_token()?;
        let rhs = operand_number(resolver, lexer)?;
        if op.is_multiplicative() {
            term = op.apply(term, rhs);
        } else {
            sum = pending.apply(sum, term);
            pending = op;
            term = rhs;
        }
    }
    out.extend_from_slice(&format_number(pending.apply(sum, term)));
    Ok(())
}

/// Evaluate `and`/`or` joined comparisons, left to right.
pub fn eval_condition(resolver: &Resolver<'_>, lexer: &mut Lexer<'_>) -> Result<bool, ErrorKind> {
    let mut result = eval_comparison(resolver, lexer)?;
    loop {
        let token = lexer.peek_token()?;
        if token.is_terminator() {
            return Ok(result);
        }
        let and = if token.is_word(b"and") {
            true
        } else if token.is_word(b"or") {
            false
        } else {
            return Err(ErrorKind::UnexpectedToken {
                expected: "'and', 'or' or end of condition",
                found: token.display(),
            });
        };
        lexer.next_token()?;
        let rhs = eval_comparison(resolver, lexer)?;
        result = if and { result && rhs } else { result || rhs };
    }
}

pub fn eval_comparison(resolver: &Resolver<'_>, lexer: &mut Lexer<'_>) -> Result<bool, ErrorKind> {
    let mut lhs = Vec::new();
    eval_arith(resolver, lexer, &mut lhs)?;

    let token = lexer.peek_token()?;
    let comparator = match token.kind {
        TokenKind::Comparator(comparator) => Some(comparator),
        TokenKind::Variable if token.is_word(b"inc") => None,
        _ => return Ok(is_truthy(&lhs)),
    };
    lexer.next_token()?;
    let mut rhs = Vec::new();
    eval_arith(resolver, lexer, &mut rhs)?;

    comparator.map_or_else(
        || Ok(contains(&lhs, &rhs)),
        |comparator| compare(comparator, &lhs, &rhs),
    )
}

/// Non-empty and not numerically zero.
#[must_use]
pub fn is_truthy(value: &[u8]) -> bool {
    !value.is_empty() && parse_number(value).is_none_or(|n| n != 0.0)
}

#[must_use]
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// `==` and `!=` compare as numbers when both sides are numeric, as bytes
/// otherwise. Ordering needs numbers.
pub fn compare(comparator: Comparator, lhs: &[u8], rhs: &[u8]) -> Result<bool, ErrorKind> {
    match comparator {
        Comparator::Eq | Comparator::Ne => {
            let equal = match (parse_number(lhs), parse_number(rhs)) {
                (Some(a), Some(b)) => a.partial_cmp(&b) == Some(Ordering::Equal),
                _ => lhs == rhs,
            };
            Ok(equal == (comparator == Comparator::Eq))
        }
        Comparator::Lt | Comparator::Le | Comparator::Gt | Comparator::Ge => {
            let (a, b) = (number(lhs)?, number(rhs)?);
            Ok(match comparator {
                Comparator::Lt => a < b,
                Comparator::Le => a <= b,
                Comparator::Gt => a > b,
                _ => a >= b,
            })
        }
    }
}
