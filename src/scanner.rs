//! Delimiter search over byte buffers.
//!
//! Every function works on a window `[from, to)` of a larger buffer so
//! fields can be located inside a parent record without copying it.

use std::fmt;

/// Record or field separator.
///
/// The three variants are deliberately distinct: an absent delimiter
/// splits on whitespace runs, an empty one splits every byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delimiter {
    /// Any run of space, tab, carriage return or newline. Leading runs
    /// are skipped.
    Whitespace,
    /// Every byte is its own element.
    EachByte,
    /// Exact byte-string match.
    Literal(Vec<u8>),
}

impl Delimiter {
    /// Build from a quoted delimiter: empty text means [`Delimiter::EachByte`].
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            Self::EachByte
        } else {
            Self::Literal(bytes.to_vec())
        }
    }

    #[must_use]
    pub fn newline() -> Self {
        Self::Literal(b"\n".to_vec())
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whitespace => write!(f, "whitespace"),
            Self::EachByte => write!(f, "each byte"),
            Self::Literal(bytes) => write!(f, "\"{}\"", bytes.escape_ascii()),
        }
    }
}

#[must_use]
pub const fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

/// First non-whitespace offset in `[from, to)`, or `to`.
#[must_use]
pub fn skip_whitespace(buf: &[u8], from: usize, to: usize) -> usize {
    let to = to.min(buf.len());
    if from >= to {
        return to;
    }
    buf[from..to]
        .iter()
        .position(|&b| !is_whitespace(b))
        .map_or(to, |p| from + p)
}

/// Offset of the next delimiter match starting in `[from, to)`.
///
/// A literal match must end at or before `to`. [`Delimiter::EachByte`]
/// treats every position as a boundary and answers `from` itself.
#[must_use]
pub fn find_delimiter(buf: &[u8], delim: &Delimiter, from: usize, to: usize) -> Option<usize> {
    let to = to.min(buf.len());
    if from >= to {
        return None;
    }
    match delim {
        Delimiter::Whitespace => buf[from..to]
            .iter()
            .position(|&b| is_whitespace(b))
            .map(|p| from + p),
        Delimiter::EachByte => Some(from),
        Delimiter::Literal(pattern) if pattern.is_empty() => Some(from),
        Delimiter::Literal(pattern) => buf[from..to]
            .windows(pattern.len())
            .position(|window| window == pattern.as_slice())
            .map(|p| from + p),
    }
}

/// Start offset of field number `index` (0-based) inside `[from, to)`.
///
/// Returns `None` when the window holds fewer than `index + 1` fields.
#[must_use]
pub fn skip_fields(
    buf: &[u8],
    delim: &Delimiter,
    index: usize,
    from: usize,
    to: usize,
) -> Option<usize> {
    let to = to.min(buf.len());
    match delim {
        Delimiter::Literal(pattern) => {
            let mut start = from;
            for _ in 0..index {
                let pos = find_delimiter(buf, delim, start, to)?;
                start = pos + pattern.len().max(1);
            }
            (start <= to).then_some(start)
        }
        Delimiter::EachByte => {
            let start = from.checked_add(index)?;
            (start < to).then_some(start)
        }
        Delimiter::Whitespace => {
            let mut start = skip_whitespace(buf, from, to);
            for _ in 0..index {
                let end = find_delimiter(buf, delim, start, to)?;
                start = skip_whitespace(buf, end, to);
            }
            (start < to).then_some(start)
        }
    }
}

/// Start of the first field of an open-ended iteration.
#[must_use]
pub fn first_field(buf: &[u8], delim: &Delimiter, from: usize, to: usize) -> Option<usize> {
    skip_fields(buf, delim, 0, from, to)
}

/// End of the field starting at `start`; the last field runs to `to`.
#[must_use]
pub fn field_end(buf: &[u8], delim: &Delimiter, start: usize, to: usize) -> usize {
    match delim {
        Delimiter::EachByte => (start + 1).min(to),
        _ => find_delimiter(buf, delim, start, to).unwrap_or(to),
    }
}

/// Start of the field after the one ending at `stop`, or `None` once
/// the window is exhausted.
#[must_use]
pub fn next_field(buf: &[u8], delim: &Delimiter, stop: usize, to: usize) -> Option<usize> {
    let to = to.min(buf.len());
    match delim {
        Delimiter::Literal(pattern) => {
            let next = stop + pattern.len().max(1);
            (next <= to).then_some(next)
        }
        Delimiter::EachByte => (stop < to).then_some(stop),
        Delimiter::Whitespace => {
            let next = skip_whitespace(buf, stop, to);
            (next < to).then_some(next)
        }
    }
}
