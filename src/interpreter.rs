//! Statement dispatch.
//!
//! The program counter is a statement index. Loops and conditionals
//! move it using the targets [`parse_script`](crate::parser::parse_script)
//! resolved; everything else falls through to the next statement.

use std::borrow::Cow;
use std::io::Write;
use std::path::Path;

use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{Error, ErrorKind};
use crate::expr;
use crate::lexer::Lexer;
use crate::parser::{Block, Keyword, Script, Statement};
use crate::registry::{Binding, Registry};
use crate::resolve::Resolver;
use crate::scanner::Delimiter;
use crate::stack::{Advance, Clause, LoopStack, Segment, Settled};
use crate::token::{Token, TokenKind};

/// Where execution continues after a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Jump(usize),
    Exit,
}

fn unexpected(expected: &'static str, found: &Token<'_>) -> ErrorKind {
    ErrorKind::UnexpectedToken {
        expected,
        found: found.display(),
    }
}

fn expect_end(lexer: &mut Lexer<'_>) -> Result<(), ErrorKind> {
    let token = lexer.next_token()?;
    if token.is_terminator() {
        Ok(())
    } else {
        Err(unexpected("end of statement", &token))
    }
}

/// A name to declare. `$` and statement keywords are taken.
fn expect_name<'a>(lexer: &mut Lexer<'a>) -> Result<Cow<'a, [u8]>, ErrorKind> {
    let token = lexer.next_token()?;
    if token.kind == TokenKind::Variable
        && *token.text != *b"$"
        && Keyword::from_word(&token.text).is_none()
    {
        Ok(token.text)
    } else {
        Err(unexpected("a name", &token))
    }
}

/// Runs a loaded [`Script`], writing `print` output to `W`.
#[derive(Debug)]
pub struct Interpreter<W: Write> {
    registry: Registry,
    loops: LoopStack,
    config: Config,
    out: W,
}

impl<W: Write> Interpreter<W> {
    #[must_use]
    pub fn new(config: Config, out: W) -> Self {
        Self {
            registry: Registry::new(),
            loops: LoopStack::new(config.chunk_size),
            config,
            out,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Give back the output sink.
    pub fn into_output(self) -> W {
        self.out
    }

    /// Execute `script` from its first statement. Output is flushed
    /// whether or not the run fails.
    pub fn run(&mut self, script: &Script) -> Result<(), Error> {
        let result = self.execute(script);
        let flushed = self.out.flush();
        result?;
        flushed.map_err(|e| Error {
            kind: e.into(),
            line: script.statements.last().map_or(0, |s| s.line),
        })
    }

    fn execute(&mut self, script: &Script) -> Result<(), Error> {
        let mut pc = 0;
        while let Some(stmt) = script.statements.get(pc) {
            trace!(pc, line = stmt.line, keyword = stmt.keyword.as_str(), "executing");
            let flow = self.step(script, pc, stmt)?;
            pc = match flow {
                Flow::Next => pc + 1,
                Flow::Jump(target) => target,
                Flow::Exit => {
                    debug!(line = stmt.line, "exit");
                    break;
                }
            };
        }
        Ok(())
    }

    fn step(&mut self, script: &Script, pc: usize, stmt: &Statement) -> Result<Flow, Error> {
        let at = |kind: ErrorKind| Error {
            kind,
            line: stmt.line,
        };
        let mut lexer = stmt.operands();
        let flow = match stmt.keyword {
            Keyword::Var => self.declare_variables(&mut lexer),
            Keyword::Print => self.print(&mut lexer),
            Keyword::File => self.declare_file(&mut lexer),
            Keyword::Field => self.declare_field(&mut lexer),
            Keyword::In => self.enter(&mut lexer, pc, stmt.block),
            Keyword::Out | Keyword::Cont => {
                expect_end(&mut lexer).and_then(|()| self.advance(stmt.keyword))
            }
            Keyword::Break => expect_end(&mut lexer).and_then(|()| self.unwind()),
            Keyword::If => return self.branch(script, stmt),
            // Reached after a taken branch: `elif` conditions are not
            // evaluated.
            Keyword::Elif | Keyword::Else => match stmt.block {
                Block::Branch { fi, .. } if stmt.keyword == Keyword::Else => {
                    expect_end(&mut lexer).map(|()| Flow::Jump(fi + 1))
                }
                Block::Branch { fi, .. } => Ok(Flow::Jump(fi + 1)),
                _ => Err(ErrorKind::UnmatchedBlockEnd(stmt.keyword.as_str())),
            },
            Keyword::Fi => expect_end(&mut lexer).map(|()| Flow::Next),
            Keyword::Exit => expect_end(&mut lexer).map(|()| Flow::Exit),
            Keyword::Assign => self.assign(&mut lexer),
        };
        flow.map_err(at)
    }

    const fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.registry, &self.loops, self.config.chunk_size)
    }

    fn declare_variables(&mut self, lexer: &mut Lexer<'_>) -> Result<Flow, ErrorKind> {
        let mut names = vec![expect_name(lexer)?];
        let value = loop {
            let token = lexer.next_token()?;
            match token.kind {
                TokenKind::Comma => names.push(expect_name(lexer)?),
                TokenKind::Assign => break expr::eval_concat(&self.resolver(), lexer)?,
                TokenKind::Terminator => break Vec::new(),
                _ => return Err(unexpected("',', '=' or end of statement", &token)),
            }
        };
        for name in &names {
            self.registry.declare_variable(name, value.clone())?;
        }
        Ok(Flow::Next)
    }

    fn print(&mut self, lexer: &mut Lexer<'_>) -> Result<Flow, ErrorKind> {
        let value = expr::eval_concat(&self.resolver(), lexer)?;
        self.out.write_all(&value)?;
        Ok(Flow::Next)
    }

    /// Text of a quote, or the value of a variable.
    fn text_operand(&self, token: &Token<'_>) -> Result<Vec<u8>, ErrorKind> {
        match token.kind {
            TokenKind::Quote => Ok(token.text.to_vec()),
            TokenKind::Variable => Ok(self.registry.variable(&token.text)?.to_vec()),
            _ => Err(unexpected("a quote or variable", token)),
        }
    }

    fn delimiter_operand(&self, token: &Token<'_>) -> Result<Delimiter, ErrorKind> {
        if token.kind == TokenKind::CloseParen {
            return Ok(Delimiter::Whitespace);
        }
        Ok(Delimiter::from_bytes(&self.text_operand(token)?))
    }

    fn declare_file(&mut self, lexer: &mut Lexer<'_>) -> Result<Flow, ErrorKind> {
        let name = expect_name(lexer)?;
        let path = self.text_operand(&lexer.next_token()?)?;

        let token = lexer.next_token()?;
        let delimiter = match token.kind {
            TokenKind::Terminator => Delimiter::newline(),
            TokenKind::Comma => {
                let delimiter = self.delimiter_operand(&lexer.next_token()?)?;
                expect_end(lexer)?;
                delimiter
            }
            _ => return Err(unexpected("',' or end of statement", &token)),
        };

        let path = String::from_utf8_lossy(&path);
        self.registry.declare_file(&name, Path::new(&*path), delimiter)?;
        Ok(Flow::Next)
    }

    fn declare_field(&mut self, lexer: &mut Lexer<'_>) -> Result<Flow, ErrorKind> {
        let name = expect_name(lexer)?;
        let token = lexer.next_token()?;
        let delimiter = if token.is_terminator() {
            Delimiter::Whitespace
        } else {
            let delimiter = self.delimiter_operand(&token)?;
            expect_end(lexer)?;
            delimiter
        };
        self.registry.declare_field(&name, delimiter)?;
        Ok(Flow::Next)
    }

    /// Parse `SEG[[index]] (. in SEG[[index]])*`.
    fn clauses(&self, lexer: &mut Lexer<'_>) -> Result<Vec<Clause>, ErrorKind> {
        let mut clauses = Vec::new();
        loop {
            let name = expect_name(lexer)?;
            let segment = match self.registry.resolve(&name)? {
                Binding::File(slot) => Segment::File(slot),
                Binding::Field(slot) => Segment::Field(slot),
                Binding::Variable(_) => {
                    return Err(ErrorKind::IndexingNonSegment(
                        String::from_utf8_lossy(&name).into_owned(),
                    ));
                }
            };
            let index = self.resolver().index(lexer)?;
            clauses.push(Clause { segment, index });

            let token = lexer.next_token()?;
            match token.kind {
                TokenKind::Terminator => return Ok(clauses),
                TokenKind::Dot => {
                    let keyword = lexer.next_token()?;
                    if !keyword.is_word(b"in") {
                        return Err(unexpected("'in' after '.'", &keyword));
                    }
                }
                _ => return Err(unexpected("'.' or end of statement", &token)),
            }
        }
    }

    fn enter(&mut self, lexer: &mut Lexer<'_>, pc: usize, block: Block) -> Result<Flow, ErrorKind> {
        let Block::Loop { out } = block else {
            return Err(ErrorKind::UnclosedLoopBlock);
        };
        let clauses = self.clauses(lexer)?;
        match self.loops.enter(&mut self.registry, &clauses, pc + 1, out)? {
            Settled::Ready => Ok(Flow::Next),
            Settled::Exhausted => Ok(Flow::Jump(out + 1)),
        }
    }

    fn advance(&mut self, keyword: Keyword) -> Result<Flow, ErrorKind> {
        match self.loops.advance(&mut self.registry)? {
            None => Err(ErrorKind::NoOpenLoop(keyword.as_str())),
            Some(Advance::Resume(resume)) => Ok(Flow::Jump(resume)),
            Some(Advance::Done { exit }) if keyword == Keyword::Cont => Ok(Flow::Jump(exit + 1)),
            Some(Advance::Done { .. }) => Ok(Flow::Next),
        }
    }

    fn unwind(&mut self) -> Result<Flow, ErrorKind> {
        self.loops
            .unwind()
            .map(|exit| Flow::Jump(exit + 1))
            .ok_or(ErrorKind::NoOpenLoop("break"))
    }

    /// Evaluate `if` and, when it is false, each `elif` in turn. Errors
    /// carry the line of the branch being evaluated.
    fn branch(&self, script: &Script, stmt: &Statement) -> Result<Flow, Error> {
        let mut current = stmt;
        let mut index = None;
        loop {
            let at = |kind: ErrorKind| Error {
                kind,
                line: current.line,
            };
            let Block::Branch { next, fi } = current.block else {
                return Err(at(ErrorKind::UnclosedConditionalBlock));
            };
            let taken = match current.keyword {
                Keyword::If | Keyword::Elif => {
                    let mut lexer = current.operands();
                    let taken = expr::eval_condition(&self.resolver(), &mut lexer).map_err(at)?;
                    trace!(line = current.line, taken, "condition");
                    taken
                }
                _ => {
                    expect_end(&mut current.operands()).map_err(at)?;
                    true
                }
            };
            if taken {
                return Ok(index.map_or(Flow::Next, |i: usize| Flow::Jump(i + 1)));
            }
            let Some(following) = script.statements.get(next).filter(|_| next != fi) else {
                return Ok(Flow::Jump(fi + 1));
            };
            current = following;
            index = Some(next);
        }
    }

    fn assign(&mut self, lexer: &mut Lexer<'_>) -> Result<Flow, ErrorKind> {
        let target = lexer.next_token()?;
        if target.kind != TokenKind::Variable {
            return Err(unexpected("a statement", &target));
        }
        let slot = match self.registry.resolve(&target.text)? {
            Binding::Variable(_) if lexer.peek_byte() == Some(b'[') => {
                return Err(ErrorKind::IndexingNonSegment(target.display()));
            }
            Binding::Variable(slot) => slot,
            Binding::File(_) | Binding::Field(_) => {
                return Err(ErrorKind::AssigningToSegment(target.display()));
            }
        };

        let operator = match lexer.next_token()?.kind {
            TokenKind::Assign => None,
            TokenKind::Arith(op) if lexer.next_token()?.kind == TokenKind::Assign => Some(op),
            _ => return Err(ErrorKind::MissingAssignmentOperator(target.display())),
        };

        let value = expr::eval_concat(&self.resolver(), lexer)?;
        let value = match operator {
            None => value,
            Some(op) => {
                let lhs = expr::number(self.registry.value(slot))?;
                let rhs = expr::number(&value)?;
                expr::format_number(op.apply(lhs, rhs))
            }
        };
        self.registry.set_value(slot, value);
        Ok(Flow::Next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_script;

    fn run(source: &str) -> (Result<(), Error>, String) {
        let script = parse_script(source.as_bytes()).expect("parse");
        let mut interpreter = Interpreter::new(Config::default(), Vec::new());
        let result = interpreter.run(&script);
        let out = String::from_utf8_lossy(&interpreter.into_output()).into_owned();
        (result, out)
    }

    fn output(source: &str) -> String {
        let (result, out) = run(source);
        result.expect("run");
        out
    }

    #[test]
    fn var_list_sets_every_name() {
        assert_eq!(output("var a, b = 'x'\nprint a, b"), "xx");
    }

    #[test]
    fn var_without_value_is_empty() {
        assert_eq!(output("var a = 1\nvar a\nprint '[', a, ']'"), "[]");
    }

    #[test]
    fn compound_assignment() {
        assert_eq!(output("var n = 2\nn *= 5\nn -= 1\nprint n"), "9");
    }

    #[test]
    fn plain_assignment_concatenates() {
        assert_eq!(output("var s\ns = 'a' 'b', 1 + 1\nprint s"), "ab2");
    }

    #[test]
    fn missing_operator() {
        let (result, _) = run("var n\nn 5");
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingAssignmentOperator("n".to_string()));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn branches() {
        let script = "var n = 2\n\
                      if n == 1\nprint 'one'\n\
                      elif n == 2\nprint 'two'\n\
                      else\nprint 'many'\nfi\nprint '.'";
        assert_eq!(output(script), "two.");
        assert_eq!(output(&script.replace("n = 2", "n = 9")), "many.");
        assert_eq!(output(&script.replace("n = 2", "n = 1")), "one.");
    }

    #[test]
    fn if_without_else_skips_to_fi() {
        assert_eq!(output("if 0\nprint 'no'\nfi\nprint 'yes'"), "yes");
    }

    #[test]
    fn elif_error_reports_its_own_line() {
        let (result, _) = run("if 0\nprint 1\nelif ghost\nprint 2\nfi");
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndeclaredName("ghost".to_string()));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn exit_stops_and_keeps_output() {
        assert_eq!(output("print 'a'\nexit\nprint 'b'"), "a");
    }

    #[test]
    fn output_kept_on_error() {
        let (result, out) = run("print 'before'\nprint nope");
        assert!(result.is_err());
        assert_eq!(out, "before");
    }

    #[test]
    fn assigning_to_segment() {
        let (result, _) = run("field f\nf = 1");
        assert_eq!(
            result.unwrap_err().kind,
            ErrorKind::AssigningToSegment("f".to_string())
        );
    }

    #[test]
    fn in_over_variable() {
        let (result, _) = run("var v\nin v\nout");
        assert_eq!(
            result.unwrap_err().kind,
            ErrorKind::IndexingNonSegment("v".to_string())
        );
    }

    #[test]
    fn field_delimiters() {
        let (result, _) = run("field a\nfield b )\nfield c ''\nfield d ','");
        result.expect("run");
        let mut interpreter = Interpreter::new(Config::default(), Vec::new());
        let script = parse_script(b"var sep = ';'\nfield e sep").expect("parse");
        interpreter.run(&script).expect("run");
        let Some(Binding::Field(slot)) = interpreter.registry().lookup(b"e") else {
            panic!("e is not a field");
        };
        assert_eq!(
            interpreter.registry().field(slot).delimiter,
            Delimiter::from_bytes(b";")
        );
    }
}
