//! Queue nodes.

use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};

use crate::alloc::{AllocError, NodeAlloc};
use crate::concurrency::reclaim::retired::Retired;
use crate::sync::AtomicPtr;

/// A link in the queue chain.
///
/// The retirement header comes first so a `NonNull<Node<T>>` and the
/// `NonNull<Retired>` handed to the domain are the same address.
#[repr(C)]
pub(crate) struct Node<T> {
    link: UnsafeCell<Retired>,
    pub(crate) next: AtomicPtr<Node<T>>,
    /// Initialized for every node except the initial sentinel. Once the node
    /// becomes the head its value has been moved out.
    value: MaybeUninit<T>,
}

const _: () = assert!(core::mem::offset_of!(Node<u64>, link) == 0);

impl<T> Node<T> {
    const LAYOUT: Layout = Layout::new::<Self>();

    /// Allocates an unlinked node, handing `value` back if allocation fails.
    pub(crate) fn alloc<A: NodeAlloc>(
        alloc: &A,
        value: MaybeUninit<T>,
    ) -> Result<NonNull<Self>, (AllocError, MaybeUninit<T>)> {
        let node = match alloc.allocate(Self::LAYOUT) {
            Ok(ptr) => ptr.cast::<Self>(),
            Err(e) => return Err((e, value)),
        };
        // SAFETY: freshly allocated with `Self::LAYOUT`.
        unsafe {
            node.as_ptr().write(Self {
                link: UnsafeCell::new(Retired::new(release::<T, A>)),
                next: AtomicPtr::new(ptr::null_mut()),
                value,
            });
        }
        Ok(node)
    }

    /// Copies the value bits out of `node` without taking ownership.
    ///
    /// # Safety
    /// `node` must be live and its value initialized. Only the thread that
    /// wins the head CAS past `node` may `assume_init` the copy.
    #[inline]
    pub(crate) unsafe fn read_value(node: NonNull<Self>) -> MaybeUninit<T> {
        ptr::read(ptr::addr_of!((*node.as_ptr()).value))
    }

    /// Drops the value held by `node` in place.
    ///
    /// # Safety
    /// The value must be initialized and never read again.
    pub(crate) unsafe fn drop_value(node: NonNull<Self>) {
        (*ptr::addr_of_mut!((*node.as_ptr()).value)).assume_init_drop();
    }

    /// Frees `node` without touching its value.
    ///
    /// # Safety
    /// `node` must come from `Node::alloc::<A>` and be unreachable by any thread.
    pub(crate) unsafe fn dealloc<A: NodeAlloc>(node: NonNull<Self>) {
        A::deallocate(node.cast(), Self::LAYOUT);
    }

    /// The retirement header of `node`.
    #[inline]
    pub(crate) fn as_retired(node: NonNull<Self>) -> NonNull<Retired> {
        node.cast()
    }
}

unsafe fn release<T, A: NodeAlloc>(retired: NonNull<Retired>) {
    Node::<T>::dealloc::<A>(retired.cast());
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::alloc::Global;

    #[test]
    fn header_and_node_share_an_address() {
        let node = Node::<u32>::alloc(&Global, MaybeUninit::new(9)).unwrap_or_else(|_| panic!());
        assert_eq!(
            Node::as_retired(node).as_ptr() as usize,
            node.as_ptr() as usize
        );
        unsafe {
            assert_eq!(Node::read_value(node).assume_init(), 9);
            Node::dealloc::<Global>(node);
        }
    }

    #[test]
    fn release_through_header_frees_the_node() {
        let node = Node::<String>::alloc(&Global, MaybeUninit::new("x".to_owned()))
            .unwrap_or_else(|_| panic!());
        unsafe {
            Node::drop_value(node);
            Retired::release(Node::as_retired(node));
        }
    }
}
