// src/runtime/mod.rs
//! Guest runtime: values, the capture arena and the stack VM

pub mod arena;
pub mod value;
pub mod vm;

pub use arena::{CaptureArena, SharedArena};
pub use value::{NativeFn, Table, Value};
pub use vm::{CallStatus, RuntimeError, Vm};
