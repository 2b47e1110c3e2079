//! Atomic primitives used by the queue and the reclamation domain.
//!
//! Under `--cfg loom` these resolve to loom's model-checked atomics so the
//! push/pop and pin/retire protocols can be explored exhaustively.

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};
#[cfg(loom)]
pub(crate) use loom::thread_local;

#[cfg(not(loom))]
pub(crate) use core::sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};
#[cfg(not(loom))]
pub(crate) use std::thread_local;
