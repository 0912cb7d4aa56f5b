//! Interpreter for grain, a small scripting language for streaming
//! record and field extraction from text files.
//!
//! A script declares *file* segments (a file split into records by a
//! delimiter) and *field* segments (a delimiter applied to whatever the
//! enclosing loop holds), then walks them with nested `in`/`out` blocks.
//! Files are read a chunk at a time, so records never need to fit the
//! whole file in memory.
//!
//! # Quick start
//!
//! ```
//! use grain::{Config, run};
//!
//! let script = b"var x = 3 + 4\nprint 'x=', x\n";
//! let mut out = Vec::new();
//! run(script, Config::default(), &mut out).unwrap();
//! assert_eq!(out, b"x=7");
//! ```
//!
//! ## Iterating a file
//!
//! ```no_run
//! use grain::{Config, run};
//!
//! let script = b"file rows 'data.csv'\n\
//!                field cols ','\n\
//!                in rows. in cols[1]\n\
//!                print $, '\\n'\n\
//!                out\n";
//! run(script, Config::default(), std::io::stdout()).unwrap();
//! ```

// Allow noisy pedantic lints that don't add value for
// a library crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod config;
pub mod error;
pub mod expr;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod reader;
pub mod registry;
pub mod resolve;
pub mod scanner;
pub mod stack;
pub mod token;

use std::io::Write;

pub use config::Config;
pub use error::{Error, ErrorKind};
pub use interpreter::Interpreter;
pub use lexer::{LexError, LexErrorKind, Lexer, tokenize};
pub use parser::{Script, Statement, parse_script};
pub use scanner::Delimiter;
pub use token::{Span, Token, TokenKind};

/// Load and run a script in one step, writing `print` output to `out`.
pub fn run<W: Write>(source: &[u8], config: Config, out: W) -> Result<(), Error> {
    let script = parse_script(source)?;
    Interpreter::new(config, out).run(&script)
}
