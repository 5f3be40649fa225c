// src/runtime/vm.rs
//! Stack-based virtual machine executing compiled guest chunks
//!
//! The VM owns the single value stack shared by script execution and the
//! marshalling bridge. Bridge code addresses the stack through the indexed
//! accessors here (1-based from the bottom, negative from the top) and must
//! keep push/pop balance; `with_balanced_stack` enforces that on every exit
//! path.

use crate::compiler::{self, Constant, FuncProto, Instruction};
use crate::runtime::arena::{CaptureArena, SharedArena};
use crate::runtime::value::{NativeFn, Table, Value};
use crate::{BudgetConfig, ScriptError};
use ahash::HashMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use thiserror::Error;

/// Errors raised during guest execution; trapped at protected boundaries
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("{0}")]
    Raised(String),

    #[error("step budget of {0} instructions exhausted")]
    BudgetExhausted(u64),

    #[error("call depth limit of {0} exceeded")]
    DepthExceeded(usize),
}

impl RuntimeError {
    fn raised(message: impl Into<String>) -> Self {
        RuntimeError::Raised(message.into())
    }
}

/// Outcome of a protected call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Ok,
    RuntimeError,
}

pub struct Vm {
    stack: Vec<Value>,
    globals: HashMap<String, Value>,
    arena: SharedArena,
    self_ref: Weak<RefCell<Vm>>,
    budget: BudgetConfig,
    steps: u64,
    depth: usize,
}

impl Vm {
    /// Create a VM wrapped for shared ownership, so promoted guest
    /// closures can address it after `run()` returns.
    pub fn new_shared(budget: BudgetConfig) -> Rc<RefCell<Vm>> {
        let vm = Rc::new_cyclic(|weak| RefCell::new(Vm::with_self_ref(budget, weak.clone())));
        vm.borrow_mut().install_builtins();
        vm
    }

    /// Standalone VM for direct use in tests; promoted closures made from
    /// it cannot outlive the borrow and will decode to Absent.
    pub fn new(budget: BudgetConfig) -> Self {
        let mut vm = Vm::with_self_ref(budget, Weak::new());
        vm.install_builtins();
        vm
    }

    fn with_self_ref(budget: BudgetConfig, self_ref: Weak<RefCell<Vm>>) -> Self {
        Self {
            stack: Vec::with_capacity(128), // Pre-allocate for performance
            globals: HashMap::default(),
            arena: CaptureArena::shared(),
            self_ref,
            budget,
            steps: 0,
            depth: 0,
        }
    }

    fn install_builtins(&mut self) {
        self.register_native("error", |vm, nargs| {
            let message = vm.arg(nargs, 1).display_string();
            Err(RuntimeError::raised(message))
        });

        self.register_native("type", |vm, nargs| {
            let name = vm.arg(nargs, 1).type_name();
            vm.push(Value::str(name));
            Ok(1)
        });

        self.register_native("tostring", |vm, nargs| {
            let s = vm.arg(nargs, 1).display_string();
            vm.push(Value::str(s));
            Ok(1)
        });

        self.register_native("print", |vm, nargs| {
            let line = (1..=nargs)
                .map(|i| vm.arg(nargs, i).display_string())
                .collect::<Vec<_>>()
                .join("\t");
            tracing::debug!(target: "hookscript::guest", "{}", line);
            Ok(0)
        });
    }

    /// Bind a native function as a global
    pub fn register_native<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut Vm, usize) -> Result<usize, RuntimeError> + 'static,
    {
        self.globals
            .insert(name.to_string(), Value::Native(NativeFn(Rc::new(f))));
    }

    // ---- stack access ------------------------------------------------

    /// Current stack height
    pub fn get_top(&self) -> usize {
        self.stack.len()
    }

    /// Truncate the stack down to `top` slots (never grows it)
    pub fn set_top(&mut self, top: usize) {
        if self.stack.len() > top {
            self.stack.truncate(top);
        }
    }

    /// Run a stack-mutating operation and restore the entry height on the
    /// way out, whatever path it takes.
    pub fn with_balanced_stack<T>(&mut self, f: impl FnOnce(&mut Vm) -> T) -> T {
        let base = self.get_top();
        let out = f(self);
        self.set_top(base);
        out
    }

    /// Resolve a 1-based index (negative counts from the top) to a stack
    /// slot; None when out of range.
    fn abs_index(&self, index: i32) -> Option<usize> {
        let len = self.stack.len() as i64;
        let slot = if index > 0 {
            index as i64 - 1
        } else if index < 0 {
            len + index as i64
        } else {
            return None;
        };

        if slot >= 0 && slot < len {
            Some(slot as usize)
        } else {
            None
        }
    }

    /// Value at a stack index; None means "no value" (out of range)
    pub fn value_at(&self, index: i32) -> Option<Value> {
        self.abs_index(index).map(|slot| self.stack[slot].clone())
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn push_nil(&mut self) {
        self.push(Value::Nil);
    }

    /// Copy the value at `index` to the top
    pub fn push_value(&mut self, index: i32) {
        let value = self.value_at(index).unwrap_or(Value::Nil);
        self.push(value);
    }

    pub fn pop_n(&mut self, n: usize) {
        let new_len = self.stack.len().saturating_sub(n);
        self.stack.truncate(new_len);
    }

    fn pop_value(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::raised("stack underflow"))
    }

    /// 1-based access to the arguments of a native call (`nargs` of them
    /// sit on top of the stack); nil when out of range
    pub fn arg(&self, nargs: usize, i: usize) -> Value {
        if i == 0 || i > nargs {
            return Value::Nil;
        }
        let slot = self.stack.len() - nargs + i - 1;
        self.stack.get(slot).cloned().unwrap_or(Value::Nil)
    }

    // ---- tables ------------------------------------------------------

    /// Push a fresh empty table
    pub fn new_table(&mut self) {
        self.push(Value::Table(Rc::new(RefCell::new(Table::new()))));
    }

    /// Push table\[i\] for the table at `index`; nil if not a table
    pub fn raw_geti(&mut self, index: i32, i: i64) {
        let value = match self.value_at(index) {
            Some(Value::Table(t)) => t.borrow().raw_geti(i),
            _ => Value::Nil,
        };
        self.push(value);
    }

    /// Pop the top value and store it at table\[i\] for the table at `index`
    pub fn raw_seti(&mut self, index: i32, i: i64) {
        let table = self.value_at(index);
        if let Some(value) = self.stack.pop() {
            if let Some(Value::Table(t)) = table {
                t.borrow_mut().raw_seti(i, value);
            }
        }
    }

    /// Pop value then key and store into the table at `index`
    pub fn set_table(&mut self, index: i32) {
        let table = self.value_at(index);
        let value = self.stack.pop();
        let key = self.stack.pop();
        if let (Some(Value::Table(t)), Some(key), Some(value)) = (table, key, value) {
            t.borrow_mut().set(key, value);
        }
    }

    /// Snapshot of the entries of the table at `index`; empty otherwise
    pub fn table_entries(&self, index: i32) -> Vec<(Value, Value)> {
        match self.value_at(index) {
            Some(Value::Table(t)) => t.borrow().entries(),
            _ => Vec::new(),
        }
    }

    // ---- globals -----------------------------------------------------

    /// Pop the top value and bind it as a global
    pub fn set_global(&mut self, name: &str) {
        if let Some(value) = self.stack.pop() {
            if matches!(value, Value::Nil) {
                self.globals.remove(name);
            } else {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    /// Push the global named `name` (nil when unbound)
    pub fn get_global(&mut self, name: &str) {
        let value = self.globals.get(name).cloned().unwrap_or(Value::Nil);
        self.push(value);
    }

    // ---- capture arena -----------------------------------------------

    pub fn arena(&self) -> SharedArena {
        self.arena.clone()
    }

    pub fn self_ref(&self) -> Weak<RefCell<Vm>> {
        self.self_ref.clone()
    }

    /// Pin the value at `index` in the capture arena; None if out of range
    pub fn capture_value_at(&mut self, index: i32) -> Option<usize> {
        let value = self.value_at(index)?;
        Some(self.arena.borrow_mut().capture(value))
    }

    /// Push the value pinned in `slot` (nil if released)
    pub fn push_captured(&mut self, slot: usize) {
        let value = self.arena.borrow().get(slot).unwrap_or(Value::Nil);
        self.push(value);
    }

    // ---- execution ---------------------------------------------------

    /// Compile and run a chunk; results are left on the stack and their
    /// count returned. Resets the step budget.
    pub fn do_string(&mut self, source: &str) -> Result<usize, ScriptError> {
        let chunk = crate::parser::parse(source)?;
        let proto = compiler::compile(&chunk)?;

        self.steps = self.budget.max_steps;
        self.push(Value::Closure(Rc::new(proto)));
        self.call_value(0).map_err(ScriptError::from)
    }

    /// Protected call: function and `nargs` arguments on top of the stack.
    /// On success the results replace them; on failure the stack is
    /// restored to just below the function and the error value pushed.
    /// Resets the step budget (this is a host entry point).
    pub fn pcall(&mut self, nargs: usize) -> CallStatus {
        let func_pos = self.stack.len().saturating_sub(nargs + 1);

        self.steps = self.budget.max_steps;
        match self.call_value(nargs) {
            Ok(_) => CallStatus::Ok,
            Err(err) => {
                self.set_top(func_pos);
                self.push(Value::str(err.to_string()));
                CallStatus::RuntimeError
            }
        }
    }

    /// Call the value sitting below `nargs` arguments; removes function and
    /// arguments, leaves the results, returns how many there are.
    fn call_value(&mut self, nargs: usize) -> Result<usize, RuntimeError> {
        if self.stack.len() < nargs + 1 {
            return Err(RuntimeError::raised("stack underflow in call"));
        }
        let func_idx = self.stack.len() - nargs - 1;
        let callee = self.stack[func_idx].clone();

        if self.depth >= self.budget.max_call_depth {
            return Err(RuntimeError::DepthExceeded(self.budget.max_call_depth));
        }

        let nres = match callee {
            Value::Native(f) => {
                self.depth += 1;
                let result = (f.0)(self, nargs);
                self.depth -= 1;
                result?
            }
            Value::Closure(proto) => {
                let mut locals: HashMap<String, Value> = HashMap::default();
                for (i, param) in proto.params.iter().enumerate() {
                    let value = if i < nargs {
                        self.stack[func_idx + 1 + i].clone()
                    } else {
                        Value::Nil
                    };
                    locals.insert(param.clone(), value);
                }

                let frame_base = self.stack.len();
                self.depth += 1;
                let result = self.execute(&proto, frame_base, &mut locals);
                self.depth -= 1;
                result?
            }
            other => {
                return Err(RuntimeError::raised(format!(
                    "attempt to call a {} value",
                    other.type_name()
                )))
            }
        };

        // Remove function and arguments, keep the results on top
        let res_start = self.stack.len() - nres;
        self.stack.drain(func_idx..res_start);
        Ok(nres)
    }

    /// Execute a function body. Leaves exactly the returned values above
    /// `frame_base` and reports their count.
    fn execute(
        &mut self,
        proto: &FuncProto,
        frame_base: usize,
        locals: &mut HashMap<String, Value>,
    ) -> Result<usize, RuntimeError> {
        let code = &proto.code;
        let mut pc = 0; // Program counter

        while pc < code.len() {
            if self.steps == 0 {
                return Err(RuntimeError::BudgetExhausted(self.budget.max_steps));
            }
            self.steps -= 1;

            let instruction = &code[pc];

            match instruction {
                Instruction::Push(constant) => {
                    let value = match constant {
                        Constant::Nil => Value::Nil,
                        Constant::Bool(b) => Value::Bool(*b),
                        Constant::Number(n) => Value::Number(*n),
                        Constant::Str(s) => Value::str(s.clone()),
                    };
                    self.push(value);
                }

                Instruction::Pop => {
                    self.pop_value()?;
                }

                Instruction::Dup => {
                    let value = self
                        .stack
                        .last()
                        .cloned()
                        .ok_or_else(|| RuntimeError::raised("stack underflow"))?;
                    self.push(value);
                }

                Instruction::LoadLocal(name) => {
                    let value = locals.get(name).cloned().unwrap_or(Value::Nil);
                    self.push(value);
                }

                Instruction::StoreLocal(name) => {
                    let value = self.pop_value()?;
                    locals.insert(name.clone(), value);
                }

                Instruction::LoadGlobal(name) => {
                    self.get_global(name);
                }

                Instruction::StoreGlobal(name) => {
                    self.set_global(name);
                }

                Instruction::NewTable => {
                    self.new_table();
                }

                Instruction::GetField(name) => {
                    let object = self.pop_value()?;
                    match object {
                        Value::Table(t) => {
                            let value = t.borrow().get_str(name);
                            self.push(value);
                        }
                        other => {
                            return Err(RuntimeError::raised(format!(
                                "attempt to index a {} value",
                                other.type_name()
                            )))
                        }
                    }
                }

                Instruction::GetIndex => {
                    let key = self.pop_value()?;
                    let object = self.pop_value()?;
                    match object {
                        Value::Table(t) => {
                            let value = t.borrow().get(&key);
                            self.push(value);
                        }
                        other => {
                            return Err(RuntimeError::raised(format!(
                                "attempt to index a {} value",
                                other.type_name()
                            )))
                        }
                    }
                }

                Instruction::SetField(name) => {
                    let value = self.pop_value()?;
                    let object = self.pop_value()?;
                    match object {
                        Value::Table(t) => t.borrow_mut().set_str(name.clone(), value),
                        other => {
                            return Err(RuntimeError::raised(format!(
                                "attempt to index a {} value",
                                other.type_name()
                            )))
                        }
                    }
                }

                Instruction::SetIndex => {
                    let value = self.pop_value()?;
                    let key = self.pop_value()?;
                    let object = self.pop_value()?;
                    match object {
                        Value::Table(t) => t.borrow_mut().set(key, value),
                        other => {
                            return Err(RuntimeError::raised(format!(
                                "attempt to index a {} value",
                                other.type_name()
                            )))
                        }
                    }
                }

                Instruction::Closure(inner) => {
                    self.push(Value::Closure(inner.clone()));
                }

                Instruction::Call(nargs) => {
                    let nres = self.call_value(*nargs)?;

                    // Expression context wants exactly one value
                    if nres == 0 {
                        self.push_nil();
                    } else if nres > 1 {
                        // Keep the first result, drop the rest
                        self.stack.truncate(self.stack.len() - nres + 1);
                    }
                }

                Instruction::Return(n) => {
                    let results = self.stack.split_off(self.stack.len() - n);
                    self.stack.truncate(frame_base);
                    self.stack.extend(results);
                    return Ok(*n);
                }

                Instruction::Add => self.arith(|a, b| a + b)?,
                Instruction::Sub => self.arith(|a, b| a - b)?,
                Instruction::Mul => self.arith(|a, b| a * b)?,
                Instruction::Div => self.arith(|a, b| a / b)?,
                Instruction::Mod => self.arith(|a, b| a % b)?,

                Instruction::Neg => {
                    let value = self.pop_value()?;
                    match value {
                        Value::Number(n) => self.push(Value::Number(-n)),
                        other => {
                            return Err(RuntimeError::raised(format!(
                                "attempt to perform arithmetic on a {} value",
                                other.type_name()
                            )))
                        }
                    }
                }

                Instruction::Concat => {
                    let b = self.pop_value()?;
                    let a = self.pop_value()?;
                    let joined = match (&a, &b) {
                        (
                            Value::Str(_) | Value::Number(_),
                            Value::Str(_) | Value::Number(_),
                        ) => format!("{}{}", a.display_string(), b.display_string()),
                        _ => {
                            let offender = if matches!(a, Value::Str(_) | Value::Number(_)) {
                                &b
                            } else {
                                &a
                            };
                            return Err(RuntimeError::raised(format!(
                                "attempt to concatenate a {} value",
                                offender.type_name()
                            )));
                        }
                    };
                    self.push(Value::str(joined));
                }

                Instruction::Eq => {
                    let b = self.pop_value()?;
                    let a = self.pop_value()?;
                    self.push(Value::Bool(a == b));
                }

                Instruction::Ne => {
                    let b = self.pop_value()?;
                    let a = self.pop_value()?;
                    self.push(Value::Bool(a != b));
                }

                Instruction::Gt => self.compare(|o| o == std::cmp::Ordering::Greater)?,
                Instruction::Gte => self.compare(|o| o != std::cmp::Ordering::Less)?,
                Instruction::Lt => self.compare(|o| o == std::cmp::Ordering::Less)?,
                Instruction::Lte => self.compare(|o| o != std::cmp::Ordering::Greater)?,

                Instruction::And => {
                    let b = self.pop_value()?;
                    let a = self.pop_value()?;
                    self.push(Value::Bool(a.truthy() && b.truthy()));
                }

                Instruction::Or => {
                    let b = self.pop_value()?;
                    let a = self.pop_value()?;
                    self.push(Value::Bool(a.truthy() || b.truthy()));
                }

                Instruction::Not => {
                    let a = self.pop_value()?;
                    self.push(Value::Bool(!a.truthy()));
                }

                Instruction::Jump(target) => {
                    pc = *target;
                    continue;
                }

                Instruction::JumpIfFalse(target) => {
                    let condition = self.pop_value()?;
                    if !condition.truthy() {
                        pc = *target;
                        continue;
                    }
                }
            }

            pc += 1;
        }

        // Fell off the end without an explicit return
        self.stack.truncate(frame_base);
        Ok(0)
    }

    fn arith(&mut self, op: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let b = self.pop_value()?;
        let a = self.pop_value()?;
        match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => {
                self.push(Value::Number(op(*x, *y)));
                Ok(())
            }
            _ => {
                let offender = if matches!(a, Value::Number(_)) { &b } else { &a };
                Err(RuntimeError::raised(format!(
                    "attempt to perform arithmetic on a {} value",
                    offender.type_name()
                )))
            }
        }
    }

    fn compare(
        &mut self,
        accept: impl Fn(std::cmp::Ordering) -> bool,
    ) -> Result<(), RuntimeError> {
        let b = self.pop_value()?;
        let a = self.pop_value()?;
        let ordering = match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
            (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
            _ => None,
        };

        match ordering {
            Some(o) => {
                self.push(Value::Bool(accept(o)));
                Ok(())
            }
            None => Err(RuntimeError::raised(format!(
                "attempt to compare {} with {}",
                a.type_name(),
                b.type_name()
            ))),
        }
    }
}

impl From<RuntimeError> for ScriptError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::BudgetExhausted(n) => ScriptError::BudgetExhausted(n),
            other => ScriptError::Runtime(other.to_string()),
        }
    }
}
