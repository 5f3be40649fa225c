// src/bridge/mod.rs
//! Marshalling bridge between host values and the guest stack
//!
//! Outbound conversion pushes at most one stack slot per host value and
//! reports the count; inbound conversion reads a stack slot without popping
//! it. Callables cross in both directions through the callback module.

pub mod callback;
pub mod inbound;
pub mod outbound;

pub use callback::GuestClosure;
pub use inbound::read_stack_value;
pub use outbound::push_host_value;

/// Marker stored at integer index 0 of every table built from a host
/// sequence. Index 0 is never used by ordinary guest code, which counts
/// from 1. The marker is in-band: a guest table that stores this exact
/// number at index 0 by hand will decode as a sequence too.
pub const SEQUENCE_SENTINEL: f64 = 29384123.0;

/// Nesting limit when decoding guest tables; deeper structure (including
/// cyclic tables) is cut off and reported as absent
pub const MAX_DECODE_DEPTH: usize = 64;
