// src/bridge/inbound.rs
//! Guest to host conversion: read a stack slot into a host value
//!
//! Reading never pops. Guest functions are promoted into host callables by
//! pinning them in the capture arena; tables decode as sequences when they
//! carry the marker at index 0 and as string-keyed mappings otherwise.

use crate::bridge::{GuestClosure, MAX_DECODE_DEPTH, SEQUENCE_SENTINEL};
use crate::host::{HostFn, HostValue};
use crate::runtime::{Value, Vm};

/// Read the value at a stack index without removing it. An out-of-range
/// index reads as `Absent`.
pub fn read_stack_value(vm: &Vm, index: i32) -> HostValue {
    match vm.value_at(index) {
        Some(value) => decode_value(vm, &value, 0),
        None => HostValue::Absent,
    }
}

fn decode_value(vm: &Vm, value: &Value, depth: usize) -> HostValue {
    if depth > MAX_DECODE_DEPTH {
        tracing::warn!(limit = MAX_DECODE_DEPTH, "table nesting too deep to decode");
        return HostValue::Absent;
    }

    match value {
        Value::Nil => HostValue::Nil,
        Value::Bool(b) => HostValue::Bool(*b),
        Value::Number(n) => HostValue::Number(*n),
        Value::Str(s) => HostValue::Text(s.to_string()),
        Value::Opaque(handle) => HostValue::Opaque(*handle),

        Value::Table(table) => {
            let marker = table.borrow().raw_geti(0);
            let is_sequence = matches!(marker, Value::Number(n) if n == SEQUENCE_SENTINEL);

            if is_sequence {
                decode_sequence(vm, value, depth)
            } else {
                decode_mapping(vm, value, depth)
            }
        }

        Value::Closure(_) | Value::Native(_) => {
            let closure = GuestClosure::promote(vm, value.clone());
            HostValue::Callable(HostFn::Guest(closure))
        }
    }
}

/// Walk indices 1, 2, ... until an element decodes as falsy on the host
/// side; the falsy element itself is not included.
fn decode_sequence(vm: &Vm, value: &Value, depth: usize) -> HostValue {
    let Value::Table(table) = value else {
        return HostValue::Absent;
    };

    let mut items = Vec::new();
    let mut index = 1i64;
    loop {
        let element = table.borrow().raw_geti(index);
        let decoded = decode_value(vm, &element, depth + 1);
        if !decoded.is_truthy() {
            break;
        }
        items.push(decoded);
        index += 1;
    }

    HostValue::Sequence(items)
}

/// Mappings keep string keys only; other key kinds are skipped. Entries
/// whose value decodes as `Absent` are dropped, mirroring the outbound
/// direction.
fn decode_mapping(vm: &Vm, value: &Value, depth: usize) -> HostValue {
    let Value::Table(table) = value else {
        return HostValue::Absent;
    };

    let entries = table.borrow().entries();
    let mut map = ahash::HashMap::default();
    for (key, element) in entries {
        let Value::Str(key) = key else {
            tracing::debug!(kind = key.type_name(), "skipping non-string table key");
            continue;
        };
        let decoded = decode_value(vm, &element, depth + 1);
        if !matches!(decoded, HostValue::Absent) {
            map.insert(key.to_string(), decoded);
        }
    }

    HostValue::Mapping(map)
}
