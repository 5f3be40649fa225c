// src/bridge/outbound.rs
//! Host to guest conversion: push a host value onto the VM stack

use crate::bridge::{callback, SEQUENCE_SENTINEL};
use crate::host::{HostFn, HostValue};
use crate::runtime::{Value, Vm};

/// Push a host value onto the stack, returning how many slots were used
/// (0 for `Absent`, 1 for everything else). Callers must balance the stack
/// with exactly this count.
pub fn push_host_value(vm: &mut Vm, value: &HostValue) -> usize {
    match value {
        HostValue::Absent => 0,

        HostValue::Nil => {
            vm.push_nil();
            1
        }

        HostValue::Bool(b) => {
            vm.push(Value::Bool(*b));
            1
        }

        HostValue::Number(n) => {
            vm.push(Value::Number(*n));
            1
        }

        HostValue::Text(s) => {
            vm.push(Value::str(s.clone()));
            1
        }

        HostValue::Sequence(items) => {
            vm.new_table();
            vm.push(Value::Number(SEQUENCE_SENTINEL));
            vm.raw_seti(-2, 0);

            // Elements that marshal to nothing are skipped; the write
            // cursor only advances on a real push, so indices stay
            // consecutive from 1.
            let mut cursor = 1i64;
            for item in items {
                if push_host_value(vm, item) == 1 {
                    vm.raw_seti(-2, cursor);
                    cursor += 1;
                }
            }
            1
        }

        HostValue::Mapping(map) => {
            vm.new_table();
            for (key, item) in map {
                vm.push(Value::str(key.clone()));
                if push_host_value(vm, item) == 1 {
                    vm.set_table(-3);
                } else {
                    // Value vanished, discard the pushed key
                    vm.pop_n(1);
                }
            }
            1
        }

        HostValue::Callable(f) => {
            // A promoted guest function still pinned in the arena goes
            // back as itself, keeping its identity
            if let HostFn::Guest(closure) = f {
                if let Some(original) = closure.pinned() {
                    vm.push(original);
                    return 1;
                }
            }
            vm.push(Value::Native(callback::wrap_host_fn(f.clone())));
            1
        }

        HostValue::Opaque(handle) => {
            vm.push(Value::Opaque(*handle));
            1
        }
    }
}
