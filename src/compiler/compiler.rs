// src/compiler/compiler.rs
//! Compiler that converts AST to bytecode

use crate::compiler::bytecode::{Constant, FuncProto, Instruction};
use crate::parser::ast::*;
use crate::ScriptError;
use ahash::HashSet;
use std::rc::Rc;

pub struct Compiler {
    instructions: Vec<Instruction>,
    label_counter: usize,
    labels: Vec<(usize, usize)>, // (label_id, instruction_index)
    locals: HashSet<String>,
}

impl Compiler {
    fn new() -> Self {
        Self {
            instructions: Vec::new(),
            label_counter: 0,
            labels: Vec::new(),
            locals: HashSet::default(),
        }
    }

    /// Compile a whole chunk into a zero-parameter function proto
    pub fn compile_chunk(chunk: &Chunk) -> Result<FuncProto, ScriptError> {
        Self::compile_function(None, &[], &chunk.body)
    }

    pub fn compile_function(
        name: Option<&str>,
        params: &[String],
        body: &[Statement],
    ) -> Result<FuncProto, ScriptError> {
        let mut compiler = Compiler::new();

        for param in params {
            compiler.locals.insert(param.clone());
        }

        for stmt in body {
            compiler.compile_statement(stmt)?;
        }

        let code = compiler.resolve_labels();

        Ok(FuncProto {
            name: name.map(|s| s.to_string()),
            params: params.to_vec(),
            code,
        })
    }

    fn compile_statement(&mut self, stmt: &Statement) -> Result<(), ScriptError> {
        match stmt {
            Statement::Local { name, value } => {
                self.compile_expression(value)?;
                self.locals.insert(name.clone());
                self.emit(Instruction::StoreLocal(name.clone()));
            }

            Statement::Assignment { target, value } => match target {
                AssignTarget::Name(name) => {
                    self.compile_expression(value)?;
                    if self.locals.contains(name) {
                        self.emit(Instruction::StoreLocal(name.clone()));
                    } else {
                        self.emit(Instruction::StoreGlobal(name.clone()));
                    }
                }
                AssignTarget::Field { object, field } => {
                    self.compile_expression(object)?;
                    self.compile_expression(value)?;
                    self.emit(Instruction::SetField(field.clone()));
                }
                AssignTarget::Index { object, index } => {
                    self.compile_expression(object)?;
                    self.compile_expression(index)?;
                    self.compile_expression(value)?;
                    self.emit(Instruction::SetIndex);
                }
            },

            Statement::FunctionDecl { name, params, body } => {
                let proto = Self::compile_function(Some(name), params, body)?;
                self.emit(Instruction::Closure(Rc::new(proto)));
                self.emit(Instruction::StoreGlobal(name.clone()));
            }

            Statement::IfStatement {
                condition,
                then_block,
                else_block,
            } => {
                self.compile_expression(condition)?;

                let else_label = self.new_label();
                let end_label = self.new_label();

                self.emit_jump_if_false(else_label);

                for stmt in then_block {
                    self.compile_statement(stmt)?;
                }

                self.emit_jump(end_label);

                self.place_label(else_label);
                if let Some(else_stmts) = else_block {
                    for stmt in else_stmts {
                        self.compile_statement(stmt)?;
                    }
                }

                self.place_label(end_label);
            }

            Statement::WhileStatement { condition, body } => {
                let start_label = self.new_label();
                let end_label = self.new_label();

                self.place_label(start_label);
                self.compile_expression(condition)?;
                self.emit_jump_if_false(end_label);

                for stmt in body {
                    self.compile_statement(stmt)?;
                }

                self.emit_jump(start_label);
                self.place_label(end_label);
            }

            Statement::Return(value) => {
                if let Some(expr) = value {
                    self.compile_expression(expr)?;
                    self.emit(Instruction::Return(1));
                } else {
                    self.emit(Instruction::Return(0));
                }
            }

            Statement::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(Instruction::Pop); // Discard result
            }
        }

        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expression) -> Result<(), ScriptError> {
        match expr {
            Expression::Binary { left, op, right } => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;

                let instruction = match op {
                    BinaryOp::Add => Instruction::Add,
                    BinaryOp::Sub => Instruction::Sub,
                    BinaryOp::Mul => Instruction::Mul,
                    BinaryOp::Div => Instruction::Div,
                    BinaryOp::Mod => Instruction::Mod,
                    BinaryOp::Concat => Instruction::Concat,
                    BinaryOp::Eq => Instruction::Eq,
                    BinaryOp::Ne => Instruction::Ne,
                    BinaryOp::Gt => Instruction::Gt,
                    BinaryOp::Gte => Instruction::Gte,
                    BinaryOp::Lt => Instruction::Lt,
                    BinaryOp::Lte => Instruction::Lte,
                    BinaryOp::And => Instruction::And,
                    BinaryOp::Or => Instruction::Or,
                };

                self.emit(instruction);
            }

            Expression::Unary { op, operand } => {
                self.compile_expression(operand)?;

                match op {
                    UnaryOp::Not => self.emit(Instruction::Not),
                    UnaryOp::Neg => self.emit(Instruction::Neg),
                }
            }

            Expression::Call { callee, args } => {
                self.compile_expression(callee)?;

                for arg in args {
                    self.compile_expression(arg)?;
                }

                self.emit(Instruction::Call(args.len()));
            }

            Expression::FieldAccess { object, field } => {
                self.compile_expression(object)?;
                self.emit(Instruction::GetField(field.clone()));
            }

            Expression::IndexAccess { object, index } => {
                self.compile_expression(object)?;
                self.compile_expression(index)?;
                self.emit(Instruction::GetIndex);
            }

            Expression::FunctionLiteral { params, body } => {
                let proto = Self::compile_function(None, params, body)?;
                self.emit(Instruction::Closure(Rc::new(proto)));
            }

            Expression::TableLiteral(items) => {
                self.emit(Instruction::NewTable);

                let mut next_index = 1i64;
                for item in items {
                    match item {
                        TableItem::Positional(value) => {
                            self.emit(Instruction::Dup);
                            self.emit(Instruction::Push(Constant::Number(next_index as f64)));
                            self.compile_expression(value)?;
                            self.emit(Instruction::SetIndex);
                            next_index += 1;
                        }
                        TableItem::Named { key, value } => {
                            self.emit(Instruction::Dup);
                            self.compile_expression(value)?;
                            self.emit(Instruction::SetField(key.clone()));
                        }
                        TableItem::Keyed { key, value } => {
                            self.emit(Instruction::Dup);
                            self.compile_expression(key)?;
                            self.compile_expression(value)?;
                            self.emit(Instruction::SetIndex);
                        }
                    }
                }
            }

            Expression::Literal(lit) => {
                let constant = match lit {
                    Literal::Nil => Constant::Nil,
                    Literal::Bool(b) => Constant::Bool(*b),
                    Literal::Number(n) => Constant::Number(*n),
                    Literal::Str(s) => Constant::Str(s.clone()),
                };
                self.emit(Instruction::Push(constant));
            }

            Expression::Variable(name) => {
                if self.locals.contains(name) {
                    self.emit(Instruction::LoadLocal(name.clone()));
                } else {
                    self.emit(Instruction::LoadGlobal(name.clone()));
                }
            }
        }

        Ok(())
    }

    fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    fn emit_jump(&mut self, label: usize) {
        self.emit(Instruction::Jump(label));
    }

    fn emit_jump_if_false(&mut self, label: usize) {
        self.emit(Instruction::JumpIfFalse(label));
    }

    fn new_label(&mut self) -> usize {
        let label = self.label_counter;
        self.label_counter += 1;
        label
    }

    fn place_label(&mut self, label: usize) {
        let position = self.instructions.len();
        self.labels.push((label, position));
    }

    fn resolve_labels(mut self) -> Vec<Instruction> {
        // Replace label IDs with actual instruction indices
        for instruction in &mut self.instructions {
            match instruction {
                Instruction::Jump(label) | Instruction::JumpIfFalse(label) => {
                    if let Some((_, pos)) = self.labels.iter().find(|(l, _)| l == label) {
                        *label = *pos;
                    }
                }
                _ => {}
            }
        }

        self.instructions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn compile(src: &str) -> FuncProto {
        let chunk = parser::parse(src).unwrap();
        Compiler::compile_chunk(&chunk).unwrap()
    }

    #[test]
    fn test_compile_return_constant() {
        let proto = compile("return 42");

        assert_eq!(
            proto.code,
            vec![
                Instruction::Push(Constant::Number(42.0)),
                Instruction::Return(1),
            ]
        );
    }

    #[test]
    fn test_compile_local_vs_global() {
        let proto = compile("local x = 1 x = 2 y = 3");

        assert!(proto
            .code
            .contains(&Instruction::StoreLocal("x".to_string())));
        assert!(proto
            .code
            .contains(&Instruction::StoreGlobal("y".to_string())));
    }

    #[test]
    fn test_compile_if_resolves_jumps() {
        let proto = compile("if true then x = 1 else x = 2 end");

        for inst in &proto.code {
            if let Instruction::Jump(target) | Instruction::JumpIfFalse(target) = inst {
                assert!(*target <= proto.code.len());
            }
        }
        assert!(proto.code.iter().any(|i| i.is_jump()));
    }

    #[test]
    fn test_compile_function_literal() {
        let proto = compile("return function(a) return a end");

        match &proto.code[0] {
            Instruction::Closure(inner) => {
                assert_eq!(inner.params, vec!["a".to_string()]);
                assert_eq!(
                    inner.code,
                    vec![
                        Instruction::LoadLocal("a".to_string()),
                        Instruction::Return(1),
                    ]
                );
            }
            other => panic!("Expected closure instruction, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_table_literal() {
        let proto = compile("return { 1, tag = 'x' }");

        assert_eq!(proto.code[0], Instruction::NewTable);
        assert!(proto
            .code
            .contains(&Instruction::SetField("tag".to_string())));
        assert!(proto.code.contains(&Instruction::SetIndex));
    }
}
