use std::fmt;

use crate::lexer::LexError;

/// Classifies a fatal script error.
///
/// Every variant ends the run; [`ErrorKind::exit_code`] gives the
/// process exit status for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Segment index beyond the available records or fields.
    OutOfRange { segment: String, index: usize },
    /// Name used before any declaration.
    UndeclaredName(String),
    /// Name re-declared as a different kind.
    NameCollision { name: String, existing: &'static str },
    /// Arithmetic or ordering comparison on a non-numeric value.
    NotANumber(String),
    /// Statement starting with a variable but no `=` or `OP=`.
    MissingAssignmentOperator(String),
    /// Tokenizer failure (bad escape, unterminated quote).
    Lex(LexError),
    /// `in` without a matching `out`.
    UnclosedLoopBlock,
    /// `if` without a matching `fi`.
    UnclosedConditionalBlock,
    /// `out`, `fi`, `elif` or `else` with nothing to close.
    UnmatchedBlockEnd(&'static str),
    /// `out`, `cont` or `break` while no loop is open.
    NoOpenLoop(&'static str),
    /// `name[...]` or `in name` where `name` is a variable.
    IndexingNonSegment(String),
    /// Assignment whose target is a file or field segment.
    AssigningToSegment(String),
    /// Field segment used with no enclosing loop buffer.
    FieldOutsideLoop(String),
    /// `$` or a bare segment name with no frame iterating it.
    NoOpenSegment(String),
    /// Token that does not fit the statement grammar.
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },
    /// Data file could not be opened.
    FileOpen { path: String, reason: String },
    /// Read, seek or write failure.
    Io(String),
}

impl ErrorKind {
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::OutOfRange { .. } => 3,
            Self::UndeclaredName(_) => 4,
            Self::NameCollision { .. } => 5,
            Self::NotANumber(_) => 6,
            Self::MissingAssignmentOperator(_) => 7,
            Self::Lex(_) => 8,
            Self::UnclosedLoopBlock => 9,
            Self::UnclosedConditionalBlock => 10,
            Self::UnmatchedBlockEnd(_) => 11,
            Self::NoOpenLoop(_) => 12,
            Self::IndexingNonSegment(_) => 13,
            Self::AssigningToSegment(_) => 14,
            Self::FieldOutsideLoop(_) => 15,
            Self::NoOpenSegment(_) => 16,
            Self::UnexpectedToken { .. } => 17,
            Self::FileOpen { .. } => 18,
            Self::Io(_) => 19,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { segment, index } => {
                write!(f, "index {index} is out of range for segment '{segment}'")
            }
            Self::UndeclaredName(name) => write!(f, "'{name}' has not been declared"),
            Self::NameCollision { name, existing } => {
                write!(f, "'{name}' already exists as a {existing}")
            }
            Self::NotANumber(value) => write!(f, "'{value}' is not a number"),
            Self::MissingAssignmentOperator(name) => {
                write!(f, "expected '=' after '{name}'")
            }
            Self::Lex(e) => write!(f, "{e}"),
            Self::UnclosedLoopBlock => write!(f, "in block without closing out"),
            Self::UnclosedConditionalBlock => write!(f, "if block without closing fi"),
            Self::UnmatchedBlockEnd(keyword) => {
                write!(f, "'{keyword}' without an open block, malformed script")
            }
            Self::NoOpenLoop(keyword) => write!(f, "'{keyword}' outside of any in block"),
            Self::IndexingNonSegment(name) => {
                write!(f, "'{name}' is a variable, not a segment")
            }
            Self::AssigningToSegment(name) => {
                write!(f, "cannot assign to segment '{name}'")
            }
            Self::FieldOutsideLoop(name) => {
                write!(f, "field segment '{name}' used with no enclosing in block")
            }
            Self::NoOpenSegment(name) => write!(f, "no open in block for '{name}'"),
            Self::UnexpectedToken { expected, found } => {
                write!(f, "expected {expected}, got '{found}'")
            }
            Self::FileOpen { path, reason } => write!(f, "cannot open '{path}': {reason}"),
            Self::Io(reason) => write!(f, "i/o error: {reason}"),
        }
    }
}

impl From<LexError> for ErrorKind {
    fn from(e: LexError) -> Self {
        Self::Lex(e)
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Fatal error with the script line it happened on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {line}")]
pub struct Error {
    pub kind: ErrorKind,
    /// 1-based script line.
    pub line: usize,
}

impl Error {
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }
}
