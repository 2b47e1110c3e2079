//! Retired nodes awaiting a grace period.
//!
//! Every reclaimable object embeds a [`Retired`] header as its first field.
//! Headers are chained intrusively, so retiring never allocates:
//! - a handle collects headers in a private [`Bag`] (no atomics),
//! - a sealed bag is spliced onto the domain-wide [`RetiredList`], a
//!   Treiber-style stack that reclaimers drain wholesale with a single swap.
//!
//! Draining by swap means each header is owned by exactly one reclaimer at a
//! time, so there is no ABA hazard on the list head.

use core::ptr::{self, NonNull};

use crossbeam_utils::CachePadded;

use crate::sync::{AtomicPtr, AtomicUsize, Ordering};

/// Intrusive retirement header.
#[repr(C)]
pub(crate) struct Retired {
    next: *mut Retired,
    generation: u64,
    release: unsafe fn(NonNull<Retired>),
}

impl Retired {
    /// Creates an unchained header that frees its object with `release`.
    pub(crate) const fn new(release: unsafe fn(NonNull<Retired>)) -> Self {
        Self {
            next: ptr::null_mut(),
            generation: 0,
            release,
        }
    }

    /// Generation this header was sealed with.
    #[inline]
    pub(crate) fn generation(this: NonNull<Self>) -> u64 {
        // SAFETY: callers own `this` (it sits in a bag or a drained chain).
        unsafe { (*this.as_ptr()).generation }
    }

    /// Frees the object carrying `this`.
    ///
    /// # Safety
    /// `this` must be unlinked from every chain and past its grace period.
    #[inline]
    pub(crate) unsafe fn release(this: NonNull<Self>) {
        let release = (*this.as_ptr()).release;
        release(this);
    }
}

/// A handle-local batch of retired headers.
#[derive(Clone, Copy)]
pub(crate) struct Bag {
    head: *mut Retired,
    tail: *mut Retired,
    len: usize,
}

impl Bag {
    pub(crate) const EMPTY: Self = Self {
        head: ptr::null_mut(),
        tail: ptr::null_mut(),
        len: 0,
    };

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Prepends `r`.
    ///
    /// # Safety
    /// The caller must own `r` exclusively; its `next` link is overwritten.
    #[inline]
    pub(crate) unsafe fn push(&mut self, r: NonNull<Retired>) {
        (*r.as_ptr()).next = self.head;
        if self.head.is_null() {
            self.tail = r.as_ptr();
        }
        self.head = r.as_ptr();
        self.len += 1;
    }

    /// Stamps every header with `generation`.
    pub(crate) fn seal(&mut self, generation: u64) {
        let mut cur = self.head;
        while let Some(r) = NonNull::new(cur) {
            // SAFETY: the bag owns its headers.
            unsafe {
                (*r.as_ptr()).generation = generation;
                cur = (*r.as_ptr()).next;
            }
        }
    }

    /// Empties the bag, returning its previous contents.
    #[inline]
    pub(crate) fn take(&mut self) -> Self {
        core::mem::replace(self, Self::EMPTY)
    }
}

/// A drained chain of headers, consumed front to back.
pub(crate) struct Drain {
    cur: *mut Retired,
}

impl Iterator for Drain {
    type Item = NonNull<Retired>;

    fn next(&mut self) -> Option<Self::Item> {
        let r = NonNull::new(self.cur)?;
        // SAFETY: the drain owns the chain; `next` is read before the caller
        // may release or re-link `r`.
        self.cur = unsafe { (*r.as_ptr()).next };
        Some(r)
    }
}

/// The domain-wide stack of sealed headers.
pub(crate) struct RetiredList {
    head: CachePadded<AtomicPtr<Retired>>,
    pending: AtomicUsize,
}

impl RetiredList {
    pub(crate) fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            pending: AtomicUsize::new(0),
        }
    }

    /// Headers currently waiting in the list (may over-count while a splice is in flight).
    #[inline]
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Splices a whole bag onto the list with one CAS.
    pub(crate) fn push_bag(&self, bag: Bag) {
        if bag.is_empty() {
            return;
        }
        // Count first so `pending` never under-reports a concurrent drain.
        self.pending.fetch_add(bag.len, Ordering::Relaxed);

        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: the bag still owns its tail until the CAS publishes it.
            unsafe { (*bag.tail).next = head };
            match self
                .head
                .compare_exchange_weak(head, bag.head, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(h) => head = h,
            }
        }
    }

    /// Detaches the whole list.
    ///
    /// The caller owns every returned header and must either release it or
    /// push it back, then report the drained count through [`Self::settle`].
    pub(crate) fn drain(&self) -> Drain {
        Drain {
            cur: self.head.swap(ptr::null_mut(), Ordering::AcqRel),
        }
    }

    /// Accounts for `drained` headers taken by [`Self::drain`].
    #[inline]
    pub(crate) fn settle(&self, drained: usize) {
        self.pending.fetch_sub(drained, Ordering::Relaxed);
    }
}

impl Drop for RetiredList {
    fn drop(&mut self) {
        // No participant can exist once the owning domain is dropped.
        for r in self.drain() {
            // SAFETY: unreachable from any queue and no reader is left.
            unsafe { Retired::release(r) };
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize as StdAtomicUsize, Ordering as StdOrdering};

    static RELEASED: StdAtomicUsize = StdAtomicUsize::new(0);

    #[repr(C)]
    struct Tracked {
        link: Retired,
        value: u32,
    }

    unsafe fn release_tracked(r: NonNull<Retired>) {
        drop(Box::from_raw(r.cast::<Tracked>().as_ptr()));
        RELEASED.fetch_add(1, StdOrdering::Relaxed);
    }

    fn tracked(value: u32) -> NonNull<Retired> {
        let boxed = Box::new(Tracked {
            link: Retired::new(release_tracked),
            value,
        });
        NonNull::from(Box::leak(boxed)).cast()
    }

    #[test]
    fn bag_seal_stamps_every_header() {
        let mut bag = Bag::EMPTY;
        let headers: Vec<_> = (0..3).map(tracked).collect();
        for &r in &headers {
            unsafe { bag.push(r) };
        }
        assert_eq!(bag.len(), 3);
        bag.seal(7);
        for &r in &headers {
            assert_eq!(Retired::generation(r), 7);
        }

        let list = RetiredList::new();
        list.push_bag(bag.take());
        assert!(bag.is_empty());
        assert_eq!(list.pending(), 3);

        let values: Vec<u32> = list
            .drain()
            .map(|r| unsafe { (*r.cast::<Tracked>().as_ptr()).value })
            .collect();
        assert_eq!(values, vec![2, 1, 0]);
        list.settle(3);
        assert_eq!(list.pending(), 0);

        for r in headers {
            unsafe { Retired::release(r) };
        }
    }

    #[test]
    fn dropping_the_list_releases_leftovers() {
        let before = RELEASED.load(StdOrdering::Relaxed);
        {
            let list = RetiredList::new();
            for batch in 0..2 {
                let mut bag = Bag::EMPTY;
                for i in 0..4 {
                    unsafe { bag.push(tracked(batch * 4 + i)) };
                }
                list.push_bag(bag);
            }
            assert_eq!(list.pending(), 8);
        }
        assert!(RELEASED.load(StdOrdering::Relaxed) - before >= 8);
    }
}
