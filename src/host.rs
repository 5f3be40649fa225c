// src/host.rs
//! Host value model: what scripts receive from and return to the embedder
//!
//! `HostValue` is the only currency crossing the bridge. It is deliberately
//! plain data plus `Callable`; anything the guest produces that has no
//! faithful host shape decodes to `Absent`.

use crate::bridge::callback::GuestClosure;
use ahash::HashMap;
use std::fmt;
use std::rc::Rc;

/// A value on the host side of the bridge
#[derive(Debug, Clone, Default)]
pub enum HostValue {
    /// No value at all: an empty stack, a failed call, an unconvertible guest value
    #[default]
    Absent,
    /// An explicit guest nil
    Nil,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Ordered values; round-trips through a guest table with a marker entry
    Sequence(Vec<HostValue>),
    /// String-keyed values
    Mapping(HashMap<String, HostValue>),
    Callable(HostFn),
    /// Host-owned handle; opaque to the guest
    Opaque(u64),
}

/// A callable crossing the bridge in either direction
#[derive(Clone)]
pub enum HostFn {
    /// Host-defined function exposed to scripts
    Host(Rc<dyn Fn(Vec<HostValue>) -> HostValue>),
    /// Guest function promoted to the host
    Guest(Rc<GuestClosure>),
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostFn::Host(ptr) => write!(f, "HostFn::Host({:p})", Rc::as_ptr(ptr)),
            HostFn::Guest(ptr) => write!(f, "HostFn::Guest({:p})", Rc::as_ptr(ptr)),
        }
    }
}

impl HostFn {
    pub fn call(&self, args: Vec<HostValue>) -> HostValue {
        match self {
            HostFn::Host(f) => f(args),
            HostFn::Guest(closure) => closure.invoke(args),
        }
    }
}

impl HostValue {
    /// Wrap a host function for handing to scripts
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> HostValue + 'static,
    {
        HostValue::Callable(HostFn::Host(Rc::new(f)))
    }

    pub fn text(s: impl Into<String>) -> Self {
        HostValue::Text(s.into())
    }

    /// Host-side falsiness, used when decoding sequences: absent, nil,
    /// false, zero, NaN and the empty string are all falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            HostValue::Absent | HostValue::Nil | HostValue::Bool(false) => false,
            HostValue::Number(n) => *n != 0.0 && !n.is_nan(),
            HostValue::Text(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Absent => "absent",
            HostValue::Nil => "nil",
            HostValue::Bool(_) => "bool",
            HostValue::Number(_) => "number",
            HostValue::Text(_) => "text",
            HostValue::Sequence(_) => "sequence",
            HostValue::Mapping(_) => "mapping",
            HostValue::Callable(_) => "callable",
            HostValue::Opaque(_) => "opaque",
        }
    }

    /// Invoke a `Callable`; anything else yields `Absent`
    pub fn call(&self, args: Vec<HostValue>) -> HostValue {
        match self {
            HostValue::Callable(f) => f.call(args),
            other => {
                tracing::warn!(kind = other.type_name(), "attempted to call a non-callable value");
                HostValue::Absent
            }
        }
    }

    /// Convert a JSON document into a host value; objects become mappings,
    /// arrays become sequences.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => HostValue::Nil,
            serde_json::Value::Bool(b) => HostValue::Bool(*b),
            serde_json::Value::Number(n) => HostValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => HostValue::Text(s.clone()),
            serde_json::Value::Array(items) => {
                HostValue::Sequence(items.iter().map(HostValue::from_json).collect())
            }
            serde_json::Value::Object(map) => HostValue::Mapping(
                map.iter()
                    .map(|(k, v)| (k.clone(), HostValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back into JSON; callables, opaque handles and `Absent` have
    /// no JSON shape and become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            HostValue::Absent | HostValue::Nil => serde_json::Value::Null,
            HostValue::Bool(b) => serde_json::Value::Bool(*b),
            HostValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            HostValue::Text(s) => serde_json::Value::String(s.clone()),
            HostValue::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(HostValue::to_json).collect())
            }
            HostValue::Mapping(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            HostValue::Callable(_) | HostValue::Opaque(_) => serde_json::Value::Null,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Absent, HostValue::Absent) => true,
            (HostValue::Nil, HostValue::Nil) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Number(a), HostValue::Number(b)) => a == b,
            (HostValue::Text(a), HostValue::Text(b)) => a == b,
            (HostValue::Sequence(a), HostValue::Sequence(b)) => a == b,
            (HostValue::Mapping(a), HostValue::Mapping(b)) => a == b,
            // Callables compare by identity
            (HostValue::Callable(HostFn::Host(a)), HostValue::Callable(HostFn::Host(b))) => {
                Rc::ptr_eq(a, b)
            }
            (HostValue::Callable(HostFn::Guest(a)), HostValue::Callable(HostFn::Guest(b))) => {
                Rc::ptr_eq(a, b)
            }
            (HostValue::Opaque(a), HostValue::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Number(n)
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        HostValue::Number(n as f64)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Text(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Text(s)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(items: Vec<HostValue>) -> Self {
        HostValue::Sequence(items)
    }
}
