// src/parser/mod.rs
//! Parser for guest script source
//!
//! Converts script source code into an Abstract Syntax Tree (AST)

pub mod ast;
pub mod lexer;
pub mod parser;

use crate::ScriptError;
pub use ast::Chunk;

/// Parse script source code into an AST
pub fn parse(source: &str) -> Result<Chunk, ScriptError> {
    let mut parser =
        parser::Parser::new(source).map_err(|e| ScriptError::Parse(e.to_string()))?;

    parser.parse().map_err(|e| ScriptError::Parse(e.to_string()))
}
