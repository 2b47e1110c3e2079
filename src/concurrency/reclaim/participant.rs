//! The participant registry.
//!
//! An append-only, lock-free intrusive list of cache-padded records. Records
//! are never unlinked while the domain lives; unregistering clears a record's
//! `in_use` flag so a later registration can claim it with one CAS.

use core::ptr::{self, NonNull};

use crossbeam_utils::{Backoff, CachePadded};

use crate::sync::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};

/// Participant state meaning "outside any critical section".
pub(crate) const QUIESCENT: u64 = 0;

/// One registered participant.
pub(crate) struct Participant {
    /// Generation observed on entering the current critical section, or
    /// [`QUIESCENT`].
    state: AtomicU64,
    in_use: AtomicBool,
    /// Immutable once the record is published.
    next: *mut Slot,
}

pub(crate) type Slot = CachePadded<Participant>;

impl Participant {
    /// Publishes entry into a critical section at `generation`.
    #[inline]
    pub(crate) fn enter(&self, generation: u64) {
        debug_assert_ne!(generation, QUIESCENT);
        self.state.store(generation, Ordering::SeqCst);
    }

    /// Publishes exit from the current critical section.
    #[inline]
    pub(crate) fn exit(&self) {
        self.state.store(QUIESCENT, Ordering::Release);
    }
}

pub(crate) struct Registry {
    head: AtomicPtr<Slot>,
    registered: AtomicUsize,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            registered: AtomicUsize::new(0),
        }
    }

    /// Number of records currently claimed.
    #[inline]
    pub(crate) fn registered(&self) -> usize {
        self.registered.load(Ordering::Relaxed)
    }

    /// Claims a free record, appending a new one if none is free.
    pub(crate) fn acquire(&self) -> NonNull<Slot> {
        self.registered.fetch_add(1, Ordering::Relaxed);

        for slot in self.iter() {
            // SAFETY: records live as long as the registry.
            let p = unsafe { slot.as_ref() };
            if !p.in_use.load(Ordering::Relaxed)
                && p
                    .in_use
                    .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return slot;
            }
        }

        let slot = Box::into_raw(Box::new(CachePadded::new(Participant {
            state: AtomicU64::new(QUIESCENT),
            in_use: AtomicBool::new(true),
            next: ptr::null_mut(),
        })));

        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: `slot` is not yet published, so this is the only
            // reference to it.
            unsafe { (&mut *slot).next = head };
            match self
                .head
                .compare_exchange_weak(head, slot, Ordering::AcqRel, Ordering::Relaxed)
            {
                // SAFETY: `Box::into_raw` never returns null.
                Ok(_) => return unsafe { NonNull::new_unchecked(slot) },
                Err(h) => head = h,
            }
        }
    }

    /// Returns a record to the free pool.
    ///
    /// # Safety
    /// `slot` must have been returned by [`Self::acquire`] on this registry and
    /// not released since.
    pub(crate) unsafe fn release(&self, slot: NonNull<Slot>) {
        let p = slot.as_ref();
        p.exit();
        p.in_use.store(false, Ordering::Release);
        self.registered.fetch_sub(1, Ordering::Relaxed);
    }

    /// Smallest entry generation among participants inside a critical section.
    pub(crate) fn oldest_active(&self) -> Option<u64> {
        self.iter()
            // SAFETY: records live as long as the registry.
            .map(|slot| unsafe { slot.as_ref() }.state.load(Ordering::SeqCst))
            .filter(|&state| state != QUIESCENT)
            .min()
    }

    /// Spins until no participant is still inside a critical section entered
    /// at or before `generation`.
    pub(crate) fn wait_past(&self, generation: u64) {
        for slot in self.iter() {
            // SAFETY: records live as long as the registry.
            let p = unsafe { slot.as_ref() };
            let backoff = Backoff::new();
            loop {
                let state = p.state.load(Ordering::SeqCst);
                if state == QUIESCENT || state > generation {
                    break;
                }
                backoff.snooze();
            }
        }
    }

    fn iter(&self) -> Iter<'_> {
        Iter {
            cur: self.head.load(Ordering::Acquire),
            _registry: core::marker::PhantomData,
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let mut cur = self.head.load(Ordering::Relaxed);
        while !cur.is_null() {
            // SAFETY: every record was created by `Box::into_raw` in `acquire`
            // and the registry is no longer shared.
            let slot = unsafe { Box::from_raw(cur) };
            cur = slot.next;
        }
    }
}

struct Iter<'a> {
    cur: *mut Slot,
    _registry: core::marker::PhantomData<&'a Registry>,
}

impl Iterator for Iter<'_> {
    type Item = NonNull<Slot>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = NonNull::new(self.cur)?;
        // SAFETY: published records are immutable in `next` and outlive `'a`.
        self.cur = unsafe { slot.as_ref() }.next;
        Some(slot)
    }
}
