// src/compiler/bytecode.rs
//! Bytecode instructions executed by the guest VM

use std::rc::Rc;

/// A compiled function body: parameter names plus its instruction stream.
///
/// The top-level chunk is a proto with no parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncProto {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub code: Vec<Instruction>,
}

/// Literal constants embedded in the instruction stream
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
}

/// Bytecode instructions executed by the VM
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    // Stack operations
    Push(Constant),
    Pop,
    Dup,

    // Variable access
    LoadLocal(String),
    StoreLocal(String),
    LoadGlobal(String),
    StoreGlobal(String),

    // Tables
    NewTable,
    /// pop table, push table\[name\]
    GetField(String),
    /// pop key, pop table, push table\[key\]
    GetIndex,
    /// pop value, pop table, set table\[name\] = value
    SetField(String),
    /// pop value, pop key, pop table, set table\[key\] = value
    SetIndex,

    // Functions
    Closure(Rc<FuncProto>),
    /// arg count; callee sits below the args, result adjusted to one slot
    Call(usize),
    /// number of results left on the stack by the returning function (0 or 1)
    Return(usize),

    // Arithmetic operations
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,

    // String operations
    Concat,

    // Comparison operations
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,

    // Logical operations
    And,
    Or,
    Not,

    // Control flow
    Jump(usize),
    JumpIfFalse(usize),
}

impl Instruction {
    /// Returns true if this instruction is a jump
    pub fn is_jump(&self) -> bool {
        matches!(self, Instruction::Jump(_) | Instruction::JumpIfFalse(_))
    }
}
