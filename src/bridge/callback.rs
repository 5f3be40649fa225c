// src/bridge/callback.rs
//! Function values crossing the bridge in both directions
//!
//! Host functions handed to the guest are wrapped as natives that unmarshal
//! their arguments and marshal their result. Guest functions handed to the
//! host are pinned in the capture arena and wrapped in a `GuestClosure`
//! that runs them through a protected call.

use crate::bridge::{inbound, outbound};
use crate::host::{HostFn, HostValue};
use crate::runtime::{CallStatus, NativeFn, SharedArena, Value, Vm};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Wrap a host callable as a guest native function
pub fn wrap_host_fn(f: HostFn) -> NativeFn {
    NativeFn(Rc::new(move |vm: &mut Vm, nargs: usize| {
        let mut args = Vec::with_capacity(nargs);
        for i in 0..nargs {
            let index = -(nargs as i32) + i as i32;
            args.push(inbound::read_stack_value(vm, index));
        }

        let result = f.call(args);
        Ok(outbound::push_host_value(vm, &result))
    }))
}

/// A guest function held by the host.
///
/// Keeps the function pinned in the capture arena for as long as any clone
/// of the handle is alive; dropping the last handle releases the slot. The
/// VM itself is held weakly, so a closure outliving its session degrades
/// to returning `Absent` rather than keeping the runtime alive.
#[derive(Debug)]
pub struct GuestClosure {
    vm: Weak<RefCell<Vm>>,
    arena: SharedArena,
    slot: usize,
}

impl GuestClosure {
    /// Pin a guest function and wrap it for the host
    pub fn promote(vm: &Vm, value: Value) -> Rc<GuestClosure> {
        let arena = vm.arena();
        let slot = arena.borrow_mut().capture(value);
        Rc::new(GuestClosure {
            vm: vm.self_ref(),
            arena,
            slot,
        })
    }

    /// The pinned guest value, if the slot is still live
    pub fn pinned(&self) -> Option<Value> {
        self.arena.borrow().get(self.slot)
    }

    /// Call the pinned function with marshalled arguments.
    ///
    /// Failures never propagate: a dead VM, a re-entrant borrow or a guest
    /// error all log a warning and yield `Absent`. The stack is restored to
    /// its entry height on every path.
    pub fn invoke(&self, args: Vec<HostValue>) -> HostValue {
        let Some(vm_cell) = self.vm.upgrade() else {
            tracing::warn!("guest callback invoked after its session was dropped");
            return HostValue::Absent;
        };
        let Ok(mut vm) = vm_cell.try_borrow_mut() else {
            tracing::warn!("guest callback invoked re-entrantly while the runtime is busy");
            return HostValue::Absent;
        };

        vm.with_balanced_stack(|vm| {
            let base = vm.get_top();
            vm.push_captured(self.slot);

            // Arguments that marshal to nothing become nil placeholders so
            // the remaining positions stay aligned
            for arg in &args {
                if outbound::push_host_value(vm, arg) == 0 {
                    vm.push_nil();
                }
            }

            match vm.pcall(args.len()) {
                CallStatus::Ok => {
                    if vm.get_top() > base {
                        inbound::read_stack_value(vm, -1)
                    } else {
                        HostValue::Absent
                    }
                }
                CallStatus::RuntimeError => {
                    let message = vm
                        .value_at(-1)
                        .map(|v| v.display_string())
                        .unwrap_or_default();
                    tracing::warn!(error = %message, "guest callback raised an error");
                    HostValue::Absent
                }
            }
        })
    }
}

impl Drop for GuestClosure {
    fn drop(&mut self) {
        self.arena.borrow_mut().release(self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BudgetConfig;

    #[test]
    fn test_host_fn_receives_unmarshalled_args() {
        let mut vm = Vm::new(BudgetConfig::default());

        let concat = HostValue::function(|args| {
            let joined = args
                .iter()
                .map(|a| match a {
                    HostValue::Text(s) => s.clone(),
                    other => other.type_name().to_string(),
                })
                .collect::<Vec<_>>()
                .join(",");
            HostValue::Text(joined)
        });

        outbound::push_host_value(&mut vm, &concat);
        vm.set_global("join");

        vm.do_string("return join('a', 'b', 1)").unwrap();
        assert_eq!(
            inbound::read_stack_value(&vm, -1),
            HostValue::text("a,b,number")
        );
    }

    #[test]
    fn test_host_fn_absent_result_reads_as_nil_in_guest() {
        let mut vm = Vm::new(BudgetConfig::default());

        let silent = HostValue::function(|_| HostValue::Absent);
        outbound::push_host_value(&mut vm, &silent);
        vm.set_global("silent");

        // Zero results from the native; the call expression yields nil
        vm.do_string("return silent() == nil").unwrap();
        assert_eq!(inbound::read_stack_value(&vm, -1), HostValue::Bool(true));
    }

    #[test]
    fn test_invoke_after_vm_dropped_is_absent() {
        let callable = {
            let vm = Vm::new_shared(BudgetConfig::default());
            let mut vm_ref = vm.borrow_mut();
            vm_ref.do_string("return function() return 1 end").unwrap();
            let value = inbound::read_stack_value(&vm_ref, -1);
            vm_ref.set_top(0);
            value
        };

        assert_eq!(callable.call(vec![]), HostValue::Absent);
    }

    #[test]
    fn test_drop_releases_arena_slot() {
        let vm = Vm::new_shared(BudgetConfig::default());
        let arena = vm.borrow().arena();

        {
            let mut vm_ref = vm.borrow_mut();
            vm_ref.do_string("return function() end").unwrap();
            let callable = inbound::read_stack_value(&vm_ref, -1);
            vm_ref.set_top(0);
            drop(vm_ref);

            assert!(matches!(callable, HostValue::Callable(_)));
            assert_eq!(arena.borrow().live_count(), 1);
        }

        assert_eq!(arena.borrow().live_count(), 0);
    }
}
