// src/lib.rs
//! Embeddable scripting bridge for running guest scripts against host data
//!
//! A `Session` owns a guest runtime (a small Lua-flavored language compiled
//! to bytecode and run on a stack VM) and a named context of host values.
//! Context entries are marshalled into guest globals on every run; the
//! script's returned value is marshalled back out. Functions cross the
//! bridge in both directions.
//!
//! # Example
//!
//! ```
//! use hookscript::{HostValue, Session};
//!
//! let mut session = Session::new();
//! session
//!     .set("threshold", HostValue::Number(10.0))
//!     .set_fn("double", |args| match args.first() {
//!         Some(HostValue::Number(n)) => HostValue::Number(n * 2.0),
//!         _ => HostValue::Absent,
//!     });
//!
//! let result = session.run("return double(threshold) + 1").unwrap();
//! assert_eq!(result, HostValue::Number(21.0));
//! ```

pub mod bridge;
pub mod compiler;
pub mod host;
pub mod parser;
pub mod runtime;

pub use bridge::{push_host_value, read_stack_value, GuestClosure, SEQUENCE_SENTINEL};
pub use host::{HostFn, HostValue};
pub use runtime::{CallStatus, RuntimeError, Value, Vm};

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// Errors surfaced to the embedder
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Execution budget of {0} steps exhausted")]
    BudgetExhausted(u64),
}

/// Execution limits applied to every run and every promoted-closure call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Instructions allowed per host entry into the runtime
    pub max_steps: u64,
    /// Nested call frames allowed at once
    pub max_call_depth: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_call_depth: 200,
        }
    }
}

/// A scripting session: one guest runtime plus a named context of host
/// values rebound as globals on every run.
///
/// The runtime is shared with any guest closures promoted to the host, so
/// callables returned by one run stay usable across later runs for as long
/// as the session lives.
pub struct Session {
    vm: Rc<RefCell<Vm>>,
    context: Vec<(String, HostValue)>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_budget(BudgetConfig::default())
    }

    pub fn with_budget(budget: BudgetConfig) -> Self {
        Self {
            vm: Vm::new_shared(budget),
            context: Vec::new(),
        }
    }

    /// Bind a named host value into the script context. Rebinding a name
    /// replaces the earlier value. Chainable.
    pub fn set(&mut self, name: impl Into<String>, value: HostValue) -> &mut Self {
        let name = name.into();
        if let Some(entry) = self.context.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.context.push((name, value));
        }
        self
    }

    /// Bind a host function into the script context. Chainable.
    pub fn set_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Vec<HostValue>) -> HostValue + 'static,
    {
        self.set(name, HostValue::function(f))
    }

    /// Run a script against the current context.
    ///
    /// Every context entry is marshalled and bound as a global first, so
    /// values set since the previous run (and reassignments) are visible.
    /// Returns the script's returned value, or `Absent` when the script
    /// returns nothing.
    pub fn run(&mut self, source: &str) -> Result<HostValue, ScriptError> {
        let vm_cell = self.vm.clone();
        let mut vm = vm_cell.borrow_mut();
        let context = &self.context;

        vm.with_balanced_stack(|vm| {
            for (name, value) in context {
                // An Absent context entry binds nothing; the global keeps
                // whatever value it had
                if bridge::push_host_value(vm, value) == 1 {
                    vm.set_global(name);
                }
            }

            let base = vm.get_top();
            vm.do_string(source)?;

            // The script returned something only if the stack grew
            if vm.get_top() > base {
                Ok(bridge::read_stack_value(vm, -1))
            } else {
                Ok(HostValue::Absent)
            }
        })
    }

    /// Current height of the runtime stack; zero between well-behaved runs
    pub fn stack_depth(&self) -> usize {
        self.vm.borrow().get_top()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_returns_value() {
        let mut session = Session::new();
        let result = session.run("return 1 + 2").unwrap();
        assert_eq!(result, HostValue::Number(3.0));
    }

    #[test]
    fn test_run_without_return_is_absent() {
        let mut session = Session::new();
        let result = session.run("local x = 1").unwrap();
        assert_eq!(result, HostValue::Absent);
    }

    #[test]
    fn test_context_rebinding() {
        let mut session = Session::new();
        session.set("x", HostValue::Number(1.0));
        assert_eq!(session.run("return x").unwrap(), HostValue::Number(1.0));

        session.set("x", HostValue::Number(2.0));
        assert_eq!(session.run("return x").unwrap(), HostValue::Number(2.0));
    }

    #[test]
    fn test_chained_set() {
        let mut session = Session::new();
        session
            .set("a", HostValue::Number(1.0))
            .set("b", HostValue::Number(2.0));

        assert_eq!(session.run("return a + b").unwrap(), HostValue::Number(3.0));
    }

    #[test]
    fn test_parse_error_is_typed() {
        let mut session = Session::new();
        let err = session.run("return +").unwrap_err();
        assert!(matches!(err, ScriptError::Parse(_)));
    }

    #[test]
    fn test_stack_is_balanced_after_error() {
        let mut session = Session::new();
        session.run("error('boom')").unwrap_err();
        assert_eq!(session.stack_depth(), 0);
    }
}
