//! The node allocation trait, the global heap allocator and its error type.

use core::alloc::Layout;
use core::ptr::NonNull;
use std::alloc::{alloc, dealloc};

/// Allocation seam for queue nodes.
///
/// Allocation goes through an instance so callers can impose policy
/// (budgets, fault injection, accounting). Deallocation is an associated
/// function: retired nodes are released by the reclamation domain, which may
/// outlive the queue and therefore the allocator instance that produced them.
/// Any implementation must hand out memory that `deallocate` can release
/// without access to `self`.
pub trait NodeAlloc {
    /// Allocates memory according to `layout`.
    ///
    /// # Errors
    /// Returns `AllocError` if allocation fails.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Deallocates memory.
    ///
    /// # Safety
    /// `ptr` must denote a block returned by `allocate` of this allocator type,
    /// and `layout` must be the layout that block was allocated with.
    unsafe fn deallocate(ptr: NonNull<u8>, layout: Layout);
}

/// The process heap (`std::alloc::alloc` / `std::alloc::dealloc`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Global;

impl NodeAlloc for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() != 0);
        // SAFETY: node layouts are never zero-sized.
        NonNull::new(unsafe { alloc(layout) }).ok_or(AllocError)
    }

    #[inline]
    unsafe fn deallocate(ptr: NonNull<u8>, layout: Layout) {
        dealloc(ptr.as_ptr(), layout);
    }
}

/// The error type for allocation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError;

impl core::fmt::Display for AllocError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("memory allocation failed")
    }
}

impl std::error::Error for AllocError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_round_trips_a_block() {
        let layout = Layout::new::<[u64; 4]>();
        let ptr = Global.allocate(layout).expect("heap allocation");
        assert_eq!(ptr.as_ptr() as usize % layout.align(), 0);
        unsafe { Global::deallocate(ptr, layout) };
    }

    #[test]
    fn alloc_error_displays() {
        assert_eq!(AllocError.to_string(), "memory allocation failed");
    }
}
