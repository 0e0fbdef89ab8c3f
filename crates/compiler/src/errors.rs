//! Error types for the Tealish compiler.
//!
//! Two kinds of fatal errors, both carrying a source line number where one
//! is known: `ParseError` for grammar and structural violations raised
//! during the build pass, and `CompileError` for semantic failures raised
//! during the process pass. There is no recovery; the first error aborts
//! compilation.

use std::fmt;

/// The input does not conform to the grammar or the structural rules
/// (pragma placement, struct ordering, exit-statement placement, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line_no: Option<usize>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line_no: Option<usize>) -> Self {
        ParseError {
            message: message.into(),
            line_no,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line_no {
            Some(n) => write!(f, "Parse error at line {}: {}", n, self.message),
            None => write!(f, "Parse error: {}", self.message),
        }
    }
}

impl std::error::Error for ParseError {}

/// The input parses but fails a semantic check: unknown type, unknown name,
/// type mismatch, arity mismatch, or a statement used in the wrong context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
    pub line_no: Option<usize>,
}

impl CompileError {
    pub fn new(message: impl Into<String>, line_no: Option<usize>) -> Self {
        CompileError {
            message: message.into(),
            line_no,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line_no {
            Some(n) => write!(f, "Compile error at line {}: {}", n, self.message),
            None => write!(f, "Compile error: {}", self.message),
        }
    }
}

impl std::error::Error for CompileError {}

/// Error type returned by the public compile entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Parse(ParseError),
    Compile(CompileError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "{}", e),
            Error::Compile(e) => write!(f, "{}", e),
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
