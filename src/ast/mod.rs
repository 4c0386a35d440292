//! Abstract Syntax Tree types.
//!
//! Architecture:
//!   Input -> Lexer -> Parser -> AST -> Evaluator -> Items / print sink

pub mod types;

pub use types::*;
