// src/runtime/arena.rs
//! Handle arena keeping captured guest values alive for host-side wrappers
//!
//! A guest function promoted to the host must stay reachable after its
//! defining call frame is gone. Each promotion pins the value in a slot
//! here; the host wrapper releases the slot when it is dropped, so the
//! arena never grows beyond the set of live wrappers.

use crate::runtime::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to the arena; wrappers hold a clone so release does not
/// need access to the VM itself.
pub type SharedArena = Rc<RefCell<CaptureArena>>;

#[derive(Debug, Default)]
pub struct CaptureArena {
    slots: Vec<Option<Value>>,
    free: Vec<usize>,
}

impl CaptureArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedArena {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Pin a value, returning its slot index
    pub fn capture(&mut self, value: Value) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(value);
                slot
            }
            None => {
                self.slots.push(Some(value));
                self.slots.len() - 1
            }
        }
    }

    /// Look up a pinned value; None if the slot was already released
    pub fn get(&self, slot: usize) -> Option<Value> {
        self.slots.get(slot).and_then(|v| v.clone())
    }

    /// Release a slot for reuse
    pub fn release(&mut self, slot: usize) {
        if let Some(entry) = self.slots.get_mut(slot) {
            if entry.take().is_some() {
                self.free.push(slot);
            }
        }
    }

    /// Number of currently pinned values
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|v| v.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_and_release() {
        let mut arena = CaptureArena::new();

        let a = arena.capture(Value::Number(1.0));
        let b = arena.capture(Value::Number(2.0));
        assert_ne!(a, b);
        assert_eq!(arena.live_count(), 2);

        assert_eq!(arena.get(a), Some(Value::Number(1.0)));

        arena.release(a);
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.live_count(), 1);
    }

    #[test]
    fn test_slot_reuse() {
        let mut arena = CaptureArena::new();

        let a = arena.capture(Value::Number(1.0));
        arena.release(a);
        let b = arena.capture(Value::Number(2.0));

        // Released slot is recycled
        assert_eq!(a, b);
        assert_eq!(arena.live_count(), 1);
    }

    #[test]
    fn test_double_release_is_harmless() {
        let mut arena = CaptureArena::new();

        let a = arena.capture(Value::Number(1.0));
        arena.release(a);
        arena.release(a);

        let b = arena.capture(Value::Number(2.0));
        let c = arena.capture(Value::Number(3.0));
        assert_ne!(b, c);
    }
}
