//! An unbounded lock-free MPMC FIFO queue (Michael–Scott).
//!
//! The chain always starts at a sentinel: `head` points at a node whose value
//! has already been taken (or at the initial placeholder), and the first live
//! value sits in `head.next`. `tail` points at the last node or lags it by
//! one; any thread that sees the lag swings it forward before continuing.
//!
//! Unlinked heads are retired into the queue's reclamation [`Domain`] and
//! freed only after a grace period, so a thread that loaded an old head or
//! tail inside its critical section can always dereference it.

use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;
use std::alloc::handle_alloc_error;
use std::sync::Arc;

use crossbeam_utils::{Backoff, CachePadded};

use super::error::PushError;
use super::node::Node;
use crate::alloc::{AllocError, Global, NodeAlloc};
use crate::concurrency::reclaim::{Domain, Handle};
use crate::sync::{AtomicPtr, Ordering};

/// A lock-free, unbounded, multi-producer multi-consumer FIFO queue.
///
/// Every operation takes the caller's [`Handle`] for the queue's domain.
///
/// ```
/// use rcu_lfq::{Domain, LfQueue};
///
/// let domain = Domain::new();
/// let queue = LfQueue::new(domain.clone());
/// let handle = domain.register();
///
/// queue.push(&handle, 1).unwrap();
/// queue.push(&handle, 2).unwrap();
/// assert_eq!(queue.pop(&handle), Some(1));
/// assert_eq!(queue.pop(&handle), Some(2));
/// assert_eq!(queue.pop(&handle), None);
/// ```
pub struct LfQueue<T, A: NodeAlloc = Global> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
    domain: Arc<Domain>,
    alloc: A,
    _marker: PhantomData<T>,
}

// SAFETY: values are moved in and out, never shared between threads.
unsafe impl<T: Send, A: NodeAlloc + Send> Send for LfQueue<T, A> {}
// SAFETY: as above; `&A` is used concurrently by `push`.
unsafe impl<T: Send, A: NodeAlloc + Sync> Sync for LfQueue<T, A> {}

impl<T> LfQueue<T> {
    /// Creates an empty queue on the global heap.
    ///
    /// Aborts through [`handle_alloc_error`] if the sentinel cannot be
    /// allocated.
    pub fn new(domain: Arc<Domain>) -> Self {
        Self::new_in(domain, Global)
    }
}

impl<T, A: NodeAlloc> LfQueue<T, A> {
    /// Creates an empty queue whose nodes come from `alloc`.
    ///
    /// Aborts through [`handle_alloc_error`] if the sentinel cannot be
    /// allocated.
    pub fn new_in(domain: Arc<Domain>, alloc: A) -> Self {
        match Self::try_new_in(domain, alloc) {
            Ok(queue) => queue,
            Err(_) => handle_alloc_error(core::alloc::Layout::new::<Node<T>>()),
        }
    }

    /// Creates an empty queue whose nodes come from `alloc`.
    ///
    /// # Errors
    /// Returns `AllocError` if the sentinel cannot be allocated.
    pub fn try_new_in(domain: Arc<Domain>, alloc: A) -> Result<Self, AllocError> {
        let sentinel = Node::alloc(&alloc, MaybeUninit::uninit()).map_err(|(e, _)| e)?;
        Ok(Self {
            head: CachePadded::new(AtomicPtr::new(sentinel.as_ptr())),
            tail: CachePadded::new(AtomicPtr::new(sentinel.as_ptr())),
            domain,
            alloc,
            _marker: PhantomData,
        })
    }

    /// The reclamation domain this queue retires its nodes into.
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// The node allocator.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Appends `value` at the tail.
    ///
    /// # Errors
    /// Returns the value inside a [`PushError`] if its node cannot be
    /// allocated; the queue is unchanged.
    ///
    /// # Panics
    /// Panics if `handle` belongs to a different domain.
    pub fn push(&self, handle: &Handle, value: T) -> Result<(), PushError<T>> {
        self.check_handle(handle);
        let node = Node::alloc(&self.alloc, MaybeUninit::new(value)).map_err(|(cause, value)| {
            // SAFETY: initialized just above and never linked.
            PushError::new(unsafe { value.assume_init() }, cause)
        })?;

        let _guard = handle.pin();
        let backoff = Backoff::new();
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            // SAFETY: `tail` was reachable after we pinned.
            let tail_next = unsafe { &(*tail).next };
            let next = tail_next.load(Ordering::Acquire);

            if !next.is_null() {
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
                continue;
            }

            if tail_next
                .compare_exchange(
                    core::ptr::null_mut(),
                    node.as_ptr(),
                    Ordering::Release,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                // Losing this is fine: whoever observes the lag finishes it.
                let _ = self.tail.compare_exchange(
                    tail,
                    node.as_ptr(),
                    Ordering::Release,
                    Ordering::Relaxed,
                );
                return Ok(());
            }
            backoff.spin();
        }
    }

    /// Removes the value at the head, or returns `None` if the queue is empty.
    ///
    /// Never blocks.
    ///
    /// # Panics
    /// Panics if `handle` belongs to a different domain.
    pub fn pop(&self, handle: &Handle) -> Option<T> {
        self.check_handle(handle);
        let guard = handle.pin();
        let backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire);
            // SAFETY: `head` was reachable after we pinned.
            let next = NonNull::new(unsafe { (*head).next.load(Ordering::Acquire) })?;

            let tail = self.tail.load(Ordering::Acquire);
            if head == tail {
                // Never move head past tail, or tail could name a retired node.
                let _ = self
                    .tail
                    .compare_exchange(tail, next.as_ptr(), Ordering::Release, Ordering::Relaxed);
                continue;
            }

            // SAFETY: `next` is live while pinned and its value is initialized.
            let value = unsafe { Node::read_value(next) };
            if self
                .head
                .compare_exchange(head, next.as_ptr(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                drop(guard);
                // SAFETY: we unlinked `head`; nobody else can retire it.
                unsafe {
                    handle.retire(Node::as_retired(NonNull::new_unchecked(head)));
                    return Some(value.assume_init());
                }
            }
            backoff.spin();
        }
    }

    /// Returns `true` if the queue held no value at the moment of the check.
    ///
    /// # Panics
    /// Panics if `handle` belongs to a different domain.
    pub fn is_empty(&self, handle: &Handle) -> bool {
        self.check_handle(handle);
        let _guard = handle.pin();
        let head = self.head.load(Ordering::Acquire);
        // SAFETY: `head` was reachable after we pinned.
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }

    #[inline]
    fn check_handle(&self, handle: &Handle) {
        assert!(
            Arc::ptr_eq(handle.domain(), &self.domain),
            "handle is registered with a different reclamation domain"
        );
    }
}

impl<T, A: NodeAlloc> Drop for LfQueue<T, A> {
    fn drop(&mut self) {
        // `&mut self`: no concurrent users, so skip the grace period.
        let mut cur = self.head.load(Ordering::Relaxed);
        let mut is_sentinel = true;
        while let Some(node) = NonNull::new(cur) {
            // SAFETY: every node in the chain came from `Node::alloc::<A>` and
            // only the non-sentinel ones still own a value.
            unsafe {
                cur = node.as_ref().next.load(Ordering::Relaxed);
                if !is_sentinel {
                    Node::drop_value(node);
                }
                Node::dealloc::<A>(node);
            }
            is_sentinel = false;
        }
    }
}

impl<T, A: NodeAlloc> core::fmt::Debug for LfQueue<T, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LfQueue")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn pop_on_fresh_queue_is_empty() {
        let domain = Domain::new();
        let queue: LfQueue<u32> = LfQueue::new(domain.clone());
        let handle = domain.register();
        assert!(queue.is_empty(&handle));
        for _ in 0..8 {
            assert_eq!(queue.pop(&handle), None);
        }
    }

    #[test]
    fn push_then_pop_preserves_order() {
        let domain = Domain::new();
        let queue = LfQueue::new(domain.clone());
        let handle = domain.register();
        queue.push(&handle, 1).unwrap();
        queue.push(&handle, 2).unwrap();
        assert!(!queue.is_empty(&handle));
        assert_eq!(queue.pop(&handle), Some(1));
        assert_eq!(queue.pop(&handle), Some(2));
        assert_eq!(queue.pop(&handle), None);
    }

    #[test]
    fn tail_follows_the_last_node() {
        let domain = Domain::new();
        let queue = LfQueue::new(domain.clone());
        let handle = domain.register();
        queue.push(&handle, 'a').unwrap();
        let tail = queue.tail.load(Ordering::Relaxed);
        let head = queue.head.load(Ordering::Relaxed);
        unsafe {
            assert_eq!((*head).next.load(Ordering::Relaxed), tail);
            assert!((*tail).next.load(Ordering::Relaxed).is_null());
        }
    }

    #[test]
    fn popped_heads_are_retired_not_freed() {
        let domain = Domain::new();
        let queue = LfQueue::new(domain.clone());
        let handle = domain.register();
        for i in 0..3 {
            queue.push(&handle, i).unwrap();
        }
        for _ in 0..3 {
            queue.pop(&handle);
        }
        assert_eq!(handle.buffered(), 3);
        assert_eq!(domain.stats().reclaimed, 0);
    }

    #[test]
    #[should_panic(expected = "different reclamation domain")]
    fn foreign_handle_is_rejected() {
        let queue: LfQueue<u8> = LfQueue::new(Domain::new());
        let other = Domain::new();
        let handle = other.register();
        let _ = queue.pop(&handle);
    }
}
