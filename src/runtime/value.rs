// src/runtime/value.rs
//! Guest value type: the dynamic values living on the VM stack and in tables

use crate::compiler::FuncProto;
use crate::runtime::vm::{RuntimeError, Vm};
use ahash::HashMap;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Dynamic guest value
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Table(Rc<RefCell<Table>>),
    Closure(Rc<FuncProto>),
    Native(NativeFn),
    /// Host-owned handle the guest can hold but not inspect
    Opaque(u64),
}

/// A host function callable from guest code.
///
/// Receives the VM and the argument count; arguments sit on top of the
/// stack. Must push its results above the arguments and return how many it
/// pushed.
#[derive(Clone)]
pub struct NativeFn(pub Rc<dyn Fn(&mut Vm, usize) -> Result<usize, RuntimeError>>);

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFn({:p})", Rc::as_ptr(&self.0))
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(Rc::from(s.into().into_boxed_str()))
    }

    /// Guest-language truthiness: only nil and false are falsy
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Dynamic type tag name, as reported by the `type` builtin
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Closure(_) | Value::Native(_) => "function",
            Value::Opaque(_) => "userdata",
        }
    }

    /// String form used by `tostring`, `print` and concatenation
    pub fn display_string(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.to_string(),
            Value::Table(t) => format!("table: {:p}", Rc::as_ptr(t)),
            Value::Closure(c) => format!("function: {:p}", Rc::as_ptr(c)),
            Value::Native(f) => format!("function: {:p}", Rc::as_ptr(&f.0)),
            Value::Opaque(h) => format!("userdata: {}", h),
        }
    }
}

/// Integers print without a trailing decimal part
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            // Reference types compare by identity
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Value::Opaque(a), Value::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_string())
    }
}

/// Guest table: an integer-keyed part plus a string-keyed part.
///
/// Keys of any other kind (booleans, non-integral numbers, reference
/// values) are silently ignored on write and read as nil, mirroring the
/// bridge's string-keys-only conversion policy.
#[derive(Debug, Default)]
pub struct Table {
    ints: BTreeMap<i64, Value>,
    strs: HashMap<String, Value>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw read at an integer index; nil when absent
    pub fn raw_geti(&self, index: i64) -> Value {
        self.ints.get(&index).cloned().unwrap_or(Value::Nil)
    }

    /// Raw write at an integer index; nil removes the slot
    pub fn raw_seti(&mut self, index: i64, value: Value) {
        if matches!(value, Value::Nil) {
            self.ints.remove(&index);
        } else {
            self.ints.insert(index, value);
        }
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.strs.get(key).cloned().unwrap_or(Value::Nil)
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if matches!(value, Value::Nil) {
            self.strs.remove(&key);
        } else {
            self.strs.insert(key, value);
        }
    }

    pub fn get(&self, key: &Value) -> Value {
        match key {
            Value::Number(n) if n.fract() == 0.0 => self.raw_geti(*n as i64),
            Value::Str(s) => self.get_str(s),
            _ => Value::Nil,
        }
    }

    pub fn set(&mut self, key: Value, value: Value) {
        match key {
            Value::Number(n) if n.fract() == 0.0 => self.raw_seti(n as i64, value),
            Value::Str(s) => self.set_str(s.to_string(), value),
            _ => {} // unsupported key kind, dropped
        }
    }

    /// Snapshot of all entries, keys materialized as guest values.
    ///
    /// This is the runtime's table-iteration primitive used by the inbound
    /// marshaller.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        let mut out = Vec::with_capacity(self.ints.len() + self.strs.len());
        for (k, v) in &self.ints {
            out.push((Value::Number(*k as f64), v.clone()));
        }
        for (k, v) in &self.strs {
            out.push((Value::str(k.clone()), v.clone()));
        }
        out
    }

    pub fn len(&self) -> usize {
        self.ints.len() + self.strs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ints.is_empty() && self.strs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(Value::Bool(true).truthy());
        assert!(Value::Number(0.0).truthy()); // zero is truthy in the guest
        assert!(Value::str("").truthy());
    }

    #[test]
    fn test_table_int_and_str_parts() {
        let mut t = Table::new();
        t.raw_seti(1, Value::Number(10.0));
        t.set_str("name", Value::str("x"));

        assert_eq!(t.raw_geti(1), Value::Number(10.0));
        assert_eq!(t.get_str("name"), Value::str("x"));
        assert_eq!(t.raw_geti(2), Value::Nil);
    }

    #[test]
    fn test_table_nil_removes() {
        let mut t = Table::new();
        t.raw_seti(1, Value::Number(10.0));
        t.raw_seti(1, Value::Nil);

        assert!(t.is_empty());
    }

    #[test]
    fn test_table_drops_unsupported_keys() {
        let mut t = Table::new();
        t.set(Value::Bool(true), Value::Number(1.0));
        t.set(Value::Number(1.5), Value::Number(2.0));

        assert!(t.is_empty());
    }

    #[test]
    fn test_number_display() {
        assert_eq!(Value::Number(3.0).display_string(), "3");
        assert_eq!(Value::Number(3.5).display_string(), "3.5");
    }

    #[test]
    fn test_reference_equality() {
        let t1 = Rc::new(RefCell::new(Table::new()));
        let a = Value::Table(t1.clone());
        let b = Value::Table(t1);
        let c = Value::Table(Rc::new(RefCell::new(Table::new())));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
