//! Compiler error type.

use std::fmt;

/// Every fatal condition the compiler can hit: a malformed token, a type
/// mismatch, a redeclaration, a resource limit, or an I/O failure talking to
/// the input or output file. opC has no error recovery, so this is the only
/// error type in the crate: the first one produced aborts compilation.
#[derive(Debug)]
pub enum CompileError {
    /// A diagnostic produced by the lexer, parser, or type checker.
    Fatal(String),
    /// Failure reading the input file or writing the output file.
    Io(std::io::Error),
}

impl CompileError {
    pub fn fatal(message: impl Into<String>) -> Self {
        CompileError::Fatal(message.into())
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Fatal(s) => write!(f, "{s}"),
            CompileError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Io(e)
    }
}

impl From<String> for CompileError {
    fn from(s: String) -> Self {
        CompileError::Fatal(s)
    }
}

impl From<&str> for CompileError {
    fn from(s: &str) -> Self {
        CompileError::Fatal(s.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
