//! Error types for every stage of the toolchain.
//!
//! Unification failure is deliberately **not** modeled here: it is a normal
//! control-flow signal handled inside the machine's failure procedure,
//! never surfaced as a `Result::Err`.

use crate::token::{Span, TokenKind};
use std::fmt;

#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ParseErrorKind {
    UnexpectedToken { expected: &'static str, found: String },
    UnexpectedEof,
    BracketsRequired { left: String, right: String },
    UndefinedOperator { name: String },
    AmbiguousFixity { name: String },
    InvalidEscape(char),
    UnterminatedString,
    UnterminatedBlockComment,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::UnexpectedToken { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            ParseErrorKind::UnexpectedEof => write!(f, "unexpected end of input"),
            ParseErrorKind::BracketsRequired { left, right } => {
                write!(f, "brackets required between '{left}' and '{right}'")
            }
            ParseErrorKind::UndefinedOperator { name } => {
                write!(f, "'{name}' is not an operator here")
            }
            ParseErrorKind::AmbiguousFixity { name } => {
                write!(f, "'{name}' cannot be both infix and postfix")
            }
            ParseErrorKind::InvalidEscape(c) => write!(f, "invalid escape sequence '\\{c}'"),
            ParseErrorKind::UnterminatedString => write!(f, "unterminated quoted string"),
            ParseErrorKind::UnterminatedBlockComment => write!(f, "unterminated block comment"),
        }
    }
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, span: Span) -> Self {
        ParseError { kind, span }
    }

    pub fn unexpected(expected: &'static str, found: &TokenKind, span: Span) -> Self {
        ParseError::new(
            ParseErrorKind::UnexpectedToken {
                expected,
                found: format!("{found:?}"),
            },
            span,
        )
    }

    /// Render the error with a line/column-annotated excerpt of `source`.
    pub fn display_with_source(&self, source: &str) -> String {
        let (line_num, line_start, line_content) = find_context(source, self.span.start);
        let col = self.span.start.saturating_sub(line_start);
        let len = (self.span.end - self.span.start).max(1);
        let underline = format!("{}{}", " ".repeat(col), "^".repeat(len));
        format!(
            "error: {}\n\n{:4} | {}\n     | {}",
            self.kind, line_num, line_content, underline
        )
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {}..{})", self.kind, self.span.start, self.span.end)
    }
}

impl std::error::Error for ParseError {}

fn find_context(source: &str, pos: usize) -> (usize, usize, &str) {
    let mut line_num = 1;
    let mut line_start = 0;
    for (i, c) in source.char_indices() {
        if i >= pos {
            break;
        }
        if c == '\n' {
            line_num += 1;
            line_start = i + 1;
        }
    }
    let line_end = source[line_start..]
        .find('\n')
        .map(|off| line_start + off)
        .unwrap_or(source.len());
    (line_num, line_start, &source[line_start..line_end])
}

/// Link/classification errors raised by the compiler.
#[derive(Debug, Clone)]
pub enum CompileErrorKind {
    /// `call f/n` with no matching clause and the module compiled in
    /// strict linkage mode.
    UnresolvedCall { functor: String, arity: u8 },
    /// A cut (`!`) appeared where the classifier could not establish a
    /// valid entry choice point to cut to.
    CutOutsideClause,
    /// `->`/2 accepted by the parser but reached the
    /// compiler, which has no core-scope lowering for soft-cut.
    UnsupportedSoftCut,
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileErrorKind::UnresolvedCall { functor, arity } => {
                write!(f, "no clauses for {functor}/{arity} (strict linkage)")
            }
            CompileErrorKind::CutOutsideClause => write!(f, "cut used outside of a clause body"),
            CompileErrorKind::UnsupportedSoftCut => {
                write!(f, "'->'/2 (soft cut) is accepted by the parser but not compiled")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub span: Option<Span>,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, span: Option<Span>) -> Self {
        CompileError { kind, span }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for CompileError {}

/// Runtime errors raised by the machine.
///
/// These are distinct from logical failure: a `next()` call that simply
/// runs out of choice points returns `Ok(None)`, not an `Err`.
#[derive(Debug, Clone)]
pub enum MachineError {
    /// `call/1` of a non-callable term, or arithmetic on an unbound variable.
    Instantiation { context: String },
    TypeError { expected: &'static str, context: String },
    /// Heap, stack, trail, or PDL exhaustion. Fatal.
    Resource { which: &'static str },
    /// `call f/n` to a predicate with no clauses and no linkage stub
    /// (lenient mode installs a stub that fails instead of erroring).
    Undefined { functor: String, arity: u8 },
}

impl fmt::Display for MachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineError::Instantiation { context } => {
                write!(f, "instantiation error: {context}")
            }
            MachineError::TypeError { expected, context } => {
                write!(f, "type error: expected {expected} ({context})")
            }
            MachineError::Resource { which } => write!(f, "resource exhaustion: {which}"),
            MachineError::Undefined { functor, arity } => {
                write!(f, "undefined procedure {functor}/{arity}")
            }
        }
    }
}

impl std::error::Error for MachineError {}

/// Unifies every stage's error for the public API and the CLI.
#[derive(Debug)]
pub enum Error {
    Parse(ParseError),
    Compile(CompileError),
    Machine(MachineError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "{e}"),
            Error::Compile(e) => write!(f, "{e}"),
            Error::Machine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<CompileError> for Error {
    fn from(e: CompileError) -> Self {
        Error::Compile(e)
    }
}

impl From<MachineError> for Error {
    fn from(e: MachineError) -> Self {
        Error::Machine(e)
    }
}

/// Maps an [`Error`] to the CLI's exit code.
pub fn exit_code(err: &Error) -> i32 {
    match err {
        Error::Parse(_) => 1,
        Error::Compile(_) => 2,
        Error::Machine(_) => 3,
    }
}
