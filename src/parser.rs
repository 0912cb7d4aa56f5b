//! Script loading.
//!
//! A script is split into statements once, up front. Each statement keeps
//! its raw text and is re-tokenized every time it runs; only the block
//! structure (`in`/`out`, `if`/`elif`/`else`/`fi`) is resolved here, so
//! jumps become statement indices.

use tracing::debug;

use crate::error::{Error, ErrorKind};
use crate::lexer::Lexer;
use crate::token::TokenKind;

/// Leading word of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Var,
    Print,
    File,
    Field,
    In,
    Out,
    Cont,
    Break,
    If,
    Elif,
    Else,
    Fi,
    Exit,
    /// No keyword: `NAME = expr` or `NAME OP= expr`.
    Assign,
}

impl Keyword {
    pub(crate) fn from_word(word: &[u8]) -> Option<Self> {
        let keyword = match word {
            b"var" => Self::Var,
            b"print" => Self::Print,
            b"file" => Self::File,
            b"field" => Self::Field,
            b"in" => Self::In,
            b"out" => Self::Out,
            b"cont" => Self::Cont,
            b"break" => Self::Break,
            b"if" => Self::If,
            b"elif" => Self::Elif,
            b"else" => Self::Else,
            b"fi" => Self::Fi,
            b"exit" => Self::Exit,
            _ => return None,
        };
        Some(keyword)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Var => "var",
            Self::Print => "print",
            Self::File => "file",
            Self::Field => "field",
            Self::In => "in",
            Self::Out => "out",
            Self::Cont => "cont",
            Self::Break => "break",
            Self::If => "if",
            Self::Elif => "elif",
            Self::Else => "else",
            Self::Fi => "fi",
            Self::Exit => "exit",
            Self::Assign => "assignment",
        }
    }
}

/// Jump targets resolved at load time, as statement indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    None,
    /// An `in` statement and its matching `out`.
    Loop { out: usize },
    /// An `if`, `elif` or `else`: the following branch (or the `fi`
    /// itself) and the closing `fi`.
    Branch { next: usize, fi: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub keyword: Keyword,
    /// Raw statement text, without its terminator.
    pub text: Vec<u8>,
    /// Offset into `text` just past the keyword.
    pub body: usize,
    /// 1-based script line.
    pub line: usize,
    pub block: Block,
}

impl Statement {
    /// Tokenizer positioned on the statement's operands.
    #[must_use]
    pub fn operands(&self) -> Lexer<'_> {
        Lexer::starting_at(&self.text, self.body)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub statements: Vec<Statement>,
}

impl Script {
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Split `source` into statements and match its blocks.
///
/// # Errors
///
/// Fails on a malformed quote, an unclosed or unmatched block, or a
/// `cont`/`break` outside of any `in` block.
pub fn parse_script(source: &[u8]) -> Result<Script, Error> {
    let mut statements = Vec::new();
    for (n, line) in source.split(|&b| b == b'\n').enumerate() {
        split_line(line, n + 1, &mut statements)?;
    }
    match_blocks(&mut statements)?;
    debug!(statements = statements.len(), "script loaded");
    Ok(Script { statements })
}

fn split_line(line: &[u8], number: usize, statements: &mut Vec<Statement>) -> Result<(), Error> {
    let at_line = |kind: ErrorKind| Error { kind, line: number };
    let mut rest = line;
    loop {
        let mut lexer = Lexer::new(rest);
        let first = lexer.next_token().map_err(|e| at_line(e.into()))?;
        let blank = first.is_terminator();
        let (keyword, body) = match Keyword::from_word(&first.text) {
            Some(keyword) if first.kind == TokenKind::Variable => {
                (keyword, lexer.position())
            }
            _ => (Keyword::Assign, 0),
        };

        let mut token = first;
        while !token.is_terminator() {
            token = lexer.next_token().map_err(|e| at_line(e.into()))?;
        }
        let end = token.span.start;

        if !blank {
            statements.push(Statement {
                keyword,
                text: rest[..end].to_vec(),
                body,
                line: number,
                block: Block::None,
            });
        }

        match rest.get(end) {
            Some(b';') => rest = &rest[end + 1..],
            _ => return Ok(()),
        }
    }
}

enum Open {
    Loop(usize),
    Conditional { branches: Vec<usize>, closed: bool },
}

fn match_blocks(statements: &mut [Statement]) -> Result<(), Error> {
    let mut open: Vec<Open> = Vec::new();

    for i in 0..statements.len() {
        let keyword = statements[i].keyword;
        let line = statements[i].line;
        let fail = |kind| Err(Error { kind, line });

        match keyword {
            Keyword::In => open.push(Open::Loop(i)),
            Keyword::Out => match open.pop() {
                Some(Open::Loop(start)) => statements[start].block = Block::Loop { out: i },
                Some(Open::Conditional { branches, .. }) => {
                    return Err(unclosed_conditional(statements, &branches));
                }
                None => return fail(ErrorKind::UnmatchedBlockEnd("out")),
            },
            Keyword::If => open.push(Open::Conditional {
                branches: vec![i],
                closed: false,
            }),
            Keyword::Elif | Keyword::Else => match open.last_mut() {
                Some(Open::Conditional { branches, closed }) if !*closed => {
                    branches.push(i);
                    *closed = keyword == Keyword::Else;
                }
                _ => return fail(ErrorKind::UnmatchedBlockEnd(keyword.as_str())),
            },
            Keyword::Fi => match open.pop() {
                Some(Open::Conditional { branches, .. }) => {
                    for (k, &branch) in branches.iter().enumerate() {
                        let next = branches.get(k + 1).copied().unwrap_or(i);
                        statements[branch].block = Block::Branch { next, fi: i };
                    }
                }
                Some(Open::Loop(start)) => {
                    return Err(Error {
                        kind: ErrorKind::UnclosedLoopBlock,
                        line: statements[start].line,
                    });
                }
                None => return fail(ErrorKind::UnmatchedBlockEnd("fi")),
            },
            Keyword::Cont | Keyword::Break
                if !open.iter().any(|block| matches!(block, Open::Loop(_))) =>
            {
                return fail(ErrorKind::NoOpenLoop(keyword.as_str()));
            }
            _ => {}
        }
    }

    match open.pop() {
        Some(Open::Loop(start)) => Err(Error {
            kind: ErrorKind::UnclosedLoopBlock,
            line: statements[start].line,
        }),
        Some(Open::Conditional { branches, .. }) => Err(unclosed_conditional(statements, &branches)),
        None => Ok(()),
    }
}

fn unclosed_conditional(statements: &[Statement], branches: &[usize]) -> Error {
    Error {
        kind: ErrorKind::UnclosedConditionalBlock,
        line: branches.first().map_or(0, |&i| statements[i].line),
    }
}
