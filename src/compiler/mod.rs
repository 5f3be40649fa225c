// src/compiler/mod.rs
//! Compiler that converts AST to bytecode

pub mod bytecode;
pub mod compiler;

use crate::parser::Chunk;
use crate::ScriptError;
pub use bytecode::{Constant, FuncProto, Instruction};

/// Compile a parsed chunk into an executable function proto
pub fn compile(chunk: &Chunk) -> Result<FuncProto, ScriptError> {
    compiler::Compiler::compile_chunk(chunk)
}
