//! Per-thread participation in a [`Domain`].

use core::cell::Cell;
use core::marker::PhantomData;
use core::ptr::NonNull;
use std::sync::Arc;

use super::domain::Domain;
use super::participant::{Participant, Slot};
use super::retired::{Bag, Retired};
use crate::sync::{fence, thread_local, Ordering};
use crate::trace::debug;

thread_local! {
    /// Handles of the current thread that are inside a critical section.
    static PINNED_HANDLES: Cell<usize> = Cell::new(0);
}

/// A registered participant of a [`Domain`].
///
/// Obtained from [`Domain::register`]. Every queue operation takes a
/// `&Handle` and runs inside one critical section opened with
/// [`Handle::pin`]. Nodes the handle retires are buffered locally and handed
/// to the domain in sealed batches.
///
/// A handle is tied to the thread that created it (`!Send`). Dropping it, or
/// calling [`Handle::unregister`], flushes its buffered retirements and
/// removes it from grace-period accounting.
pub struct Handle {
    domain: Arc<Domain>,
    slot: NonNull<Slot>,
    pins: Cell<usize>,
    bag: Cell<Bag>,
    // Critical sections are per thread.
    _not_send: PhantomData<*mut ()>,
}

impl Handle {
    pub(crate) fn new(domain: Arc<Domain>, slot: NonNull<Slot>) -> Self {
        Self {
            domain,
            slot,
            pins: Cell::new(0),
            bag: Cell::new(Bag::EMPTY),
            _not_send: PhantomData,
        }
    }

    /// The domain this handle belongs to.
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// Enters a read-side critical section.
    ///
    /// Nodes reachable when the section is entered are not freed until the
    /// returned guard (and any guard nested inside it) is dropped. Pinning is
    /// reentrant; only the outermost guard publishes entry and exit.
    pub fn pin(&self) -> Guard<'_> {
        let pins = self.pins.get();
        if pins == 0 {
            let generation = self.domain.current_generation();
            self.participant().enter(generation);
            fence(Ordering::SeqCst);
            PINNED_HANDLES.with(|n| n.set(n.get() + 1));
        }
        self.pins.set(pins + 1);
        Guard { handle: self }
    }

    /// Returns `true` while at least one guard of this handle is alive.
    pub fn is_pinned(&self) -> bool {
        self.pins.get() > 0
    }

    /// Number of retired nodes buffered locally and not yet sealed.
    pub fn buffered(&self) -> usize {
        self.bag.get().len()
    }

    /// Seals the local bag now instead of waiting for it to fill.
    pub fn flush(&self) {
        let mut bag = self.bag.get();
        self.domain.seal(&mut bag);
        self.bag.set(bag);
    }

    /// Waits for a full grace period, then runs a reclaim pass and returns the
    /// number of nodes it freed.
    ///
    /// Every node this handle retired before the call is freed by the time it
    /// returns. If another thread is running a reclaim pass, this waits for
    /// that pass to finish and then runs its own.
    ///
    /// # Panics
    /// Panics if any handle of the calling thread, on any domain, is pinned;
    /// waiting for the thread's own critical section to end would never
    /// return.
    pub fn synchronize(&self) -> usize {
        assert!(
            PINNED_HANDLES.with(Cell::get) == 0,
            "synchronize called inside a critical section"
        );
        self.flush();
        let horizon = self.domain.wait_for_readers();
        let freed = self.domain.reclaim_past(horizon);
        debug!(freed, "grace period elapsed");
        freed
    }

    /// Unregisters the participant. Equivalent to dropping the handle.
    pub fn unregister(self) {
        drop(self);
    }

    /// Queues `retired` for release after a grace period.
    ///
    /// # Safety
    /// `retired` must be unlinked from every shared structure of this domain,
    /// retired exactly once, and its release function must be sound to call
    /// once no participant can still observe it.
    pub(crate) unsafe fn retire(&self, retired: NonNull<Retired>) {
        let mut bag = self.bag.get();
        bag.push(retired);
        if bag.len() >= self.domain.config().bag_capacity() {
            self.domain.seal(&mut bag);
        }
        self.bag.set(bag);
    }

    #[inline]
    fn participant(&self) -> &Participant {
        // SAFETY: the record is owned by our domain's registry, which lives
        // as long as the `Arc<Domain>` we hold.
        unsafe { self.slot.as_ref() }
    }

    #[inline]
    fn unpin(&self) {
        let pins = self.pins.get();
        debug_assert!(pins > 0, "unpinning an unpinned handle");
        if pins == 1 {
            self.participant().exit();
            PINNED_HANDLES.with(|n| n.set(n.get() - 1));
        }
        self.pins.set(pins - 1);
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.flush();
        // SAFETY: `slot` came from this domain and is released only here.
        unsafe { self.domain.unregister(self.slot) };
        self.domain.try_reclaim();
    }
}

impl core::fmt::Debug for Handle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Handle")
            .field("pins", &self.pins.get())
            .field("buffered", &self.buffered())
            .finish_non_exhaustive()
    }
}

/// An open critical section. Dropping it exits the section.
#[must_use = "dropping the guard immediately exits the critical section"]
pub struct Guard<'h> {
    handle: &'h Handle,
}

impl<'h> Guard<'h> {
    /// The handle that opened this critical section.
    pub fn handle(&self) -> &'h Handle {
        self.handle
    }
}

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        self.handle.unpin();
    }
}

impl core::fmt::Debug for Guard<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}
