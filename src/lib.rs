//! opC Compiler Library
//!
//! Provides single-pass compilation from opC source to Onramp VM assembly.

pub mod compiler;
pub mod emit;
pub mod error;
pub mod lexer;
pub mod record;
pub mod symtab;
pub mod types;

pub use compiler::Compiler;
pub use error::{CompileError, Result};

use std::fs;
use std::path::Path;

/// Compiles an opC source file straight to an assembly file.
///
/// The whole translation unit is read into memory up front: the compiler
/// itself is streaming (one token of lookahead, no AST), but there is no
/// advantage to also streaming the read of the input file.
pub fn compile_file(source_path: &Path, output_path: &Path) -> Result<()> {
    let source = fs::read_to_string(source_path)?;
    let filename = source_path.to_string_lossy();
    let output = fs::File::create(output_path)?;
    let mut compiler = Compiler::new(&source, &filename, output)?;
    compiler.compile()
}

/// Compiles an opC source string to an assembly string, for use in tests
/// and tools that don't want to touch the filesystem.
pub fn compile_to_string(source: &str, filename: &str) -> Result<String> {
    let mut compiler = Compiler::new(source, filename, Vec::new())?;
    compiler.compile()?;
    let bytes = compiler.into_output();
    String::from_utf8(bytes)
        .map_err(|e| CompileError::fatal(format!("Generated assembly was not valid UTF-8: {e}")))
}
