//! Node allocation.

pub mod allocator;

pub use allocator::{AllocError, Global, NodeAlloc};
