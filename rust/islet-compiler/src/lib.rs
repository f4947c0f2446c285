//! Islet Compiler
//!
//! Turns interpreter source text into a checked [`compiler::ast::Program`].
//! The front end is pure: it never touches runtime state.

pub mod compiler;

use compiler::ast::Program;
use compiler::check::CheckError;
use compiler::lexer::{LexError, Lexer};
use compiler::parser::{ParseError, Parser};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("syntax error: {0}")]
    Parse(#[from] ParseError),
    #[error("syntax error: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Check(Vec<CheckError>),
}

impl CompileError {
    /// Line of the first reported problem.
    pub fn line(&self) -> usize {
        match self {
            CompileError::Lex(e) => e.line(),
            CompileError::Parse(e) => e.line(),
            CompileError::Check(errs) => errs.first().map(|e| e.line()).unwrap_or(0),
        }
    }
}

impl From<Vec<CheckError>> for CompileError {
    fn from(errs: Vec<CheckError>) -> Self {
        CompileError::Check(errs)
    }
}

/// Lex, parse and check a source string.
pub fn compile(source: &str) -> Result<Program, CompileError> {
    let tokens = Lexer::new(source).tokenize()?;
    let program = Parser::new(tokens).parse_program()?;
    compiler::check::check(&program)?;
    Ok(program)
}
