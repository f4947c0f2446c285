pub mod ast;
pub mod check;
pub mod lexer;
pub mod parser;
pub mod tokens;
