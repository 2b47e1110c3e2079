//! The reclamation domain: global generation, registry, retired list.

use std::sync::Arc;

use crossbeam_utils::{Backoff, CachePadded};
use serde::{Deserialize, Serialize};

use super::config::ReclaimConfig;
use super::handle::Handle;
use super::participant::Registry;
use super::retired::{Bag, Retired, RetiredList};
use crate::sync::{fence, AtomicBool, AtomicU64, AtomicUsize, Ordering};
use crate::trace::{debug, trace};

/// A shared context for deferred reclamation.
///
/// A domain tracks which participants are inside read-side critical sections
/// and frees retired nodes once every critical section that could still
/// observe them has ended.
///
/// # Protocol
///
/// - Entering a critical section stores the current global generation in the
///   participant's record, then issues a `SeqCst` fence.
/// - Sealing a bag of retired nodes bumps the global generation with one
///   `fetch_add`; the value it returns becomes the bag's tag `g`.
/// - A reclaim pass drains the retired list, fences, and frees every node
///   tagged `g` for which every active participant entered at a generation
///   greater than `g`. Such a participant read a generation published after the
///   node was unlinked, so it can never have observed it.
/// - At most one pass runs at a time. A pass that finds another one running
///   returns immediately; the nodes stay queued for the next pass.
/// - A pass that keeps `k` nodes raises the automatic trigger to
///   `k + reclaim_threshold`, so a long-lived reader does not make every seal
///   rescan the whole backlog.
///
/// Queues and handles hold an `Arc<Domain>`, so a domain always outlives the
/// nodes it still has to free.
pub struct Domain {
    generation: CachePadded<AtomicU64>,
    registry: Registry,
    retired: RetiredList,
    config: ReclaimConfig,
    /// Held by the running reclaim pass.
    reclaiming: AtomicBool,
    /// Pending count that triggers an automatic pass.
    trigger: AtomicUsize,
    retired_total: AtomicU64,
    reclaimed_total: AtomicU64,
    passes: AtomicU64,
}

/// Point-in-time counters of a [`Domain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainStats {
    /// Current global generation.
    pub generation: u64,
    /// Handles currently registered.
    pub participants: usize,
    /// Sealed nodes still waiting for their grace period.
    pub pending: usize,
    /// Nodes ever sealed into the retired list.
    pub retired: u64,
    /// Nodes ever freed by reclaim passes.
    pub reclaimed: u64,
    /// Reclaim passes that drained a non-empty list.
    pub passes: u64,
}

impl Domain {
    /// Creates a domain with the default [`ReclaimConfig`].
    pub fn new() -> Arc<Self> {
        Self::with_config(ReclaimConfig::default())
    }

    /// Creates a domain with a custom configuration.
    pub fn with_config(config: ReclaimConfig) -> Arc<Self> {
        let config = config.normalized();
        Arc::new(Self {
            // 0 is reserved for "outside any critical section".
            generation: CachePadded::new(AtomicU64::new(1)),
            registry: Registry::new(),
            retired: RetiredList::new(),
            config,
            reclaiming: AtomicBool::new(false),
            trigger: AtomicUsize::new(config.reclaim_threshold()),
            retired_total: AtomicU64::new(0),
            reclaimed_total: AtomicU64::new(0),
            passes: AtomicU64::new(0),
        })
    }

    /// Registers the calling thread as a participant.
    ///
    /// The returned handle must be passed to every queue operation on this
    /// domain. Dropping it unregisters the participant.
    pub fn register(self: &Arc<Self>) -> Handle {
        let slot = self.registry.acquire();
        debug!(participants = self.registry.registered(), "participant registered");
        Handle::new(Arc::clone(self), slot)
    }

    /// The active configuration (zero values already clamped).
    pub fn config(&self) -> &ReclaimConfig {
        &self.config
    }

    /// Runs one reclaim pass and returns the number of nodes freed.
    ///
    /// Nodes whose grace period has not elapsed stay queued for a later pass.
    /// Returns 0 without waiting if another pass is already running.
    pub fn try_reclaim(&self) -> usize {
        match ReclaimLock::try_acquire(&self.reclaiming) {
            Some(_lock) => self.reclaim_locked(0),
            None => 0,
        }
    }

    /// Runs a reclaim pass, waiting for any running pass to finish first.
    ///
    /// Every node tagged below `horizon` is freed: the caller has already
    /// waited out every participant that could have observed it.
    pub(crate) fn reclaim_past(&self, horizon: u64) -> usize {
        let _lock = ReclaimLock::acquire(&self.reclaiming);
        self.reclaim_locked(horizon)
    }

    fn reclaim_locked(&self, horizon: u64) -> usize {
        let threshold = self.config.reclaim_threshold();
        let mut chain = self.retired.drain().peekable();
        if chain.peek().is_none() {
            self.trigger.store(threshold, Ordering::Relaxed);
            return 0;
        }

        let mut drained = 0;
        let mut freed = 0;
        let mut survivors = Bag::EMPTY;

        // Every drained node was unlinked before the swap; order that against
        // the participant scan below.
        fence(Ordering::SeqCst);
        let oldest = self.registry.oldest_active();

        for r in chain {
            drained += 1;
            let generation = Retired::generation(r);
            if generation < horizon || oldest.map_or(true, |entered| generation < entered) {
                // SAFETY: unlinked, drained by us, and no active participant
                // entered before it was sealed.
                unsafe { Retired::release(r) };
                freed += 1;
            } else {
                // SAFETY: drained nodes are exclusively ours.
                unsafe { survivors.push(r) };
            }
        }

        self.retired.settle(drained);
        self.retired.push_bag(survivors);
        self.trigger.store(survivors.len() + threshold, Ordering::Relaxed);
        self.reclaimed_total.fetch_add(freed as u64, Ordering::Relaxed);
        self.passes.fetch_add(1, Ordering::Relaxed);

        trace!(freed, kept = survivors.len(), oldest = ?oldest, horizon, "reclaim pass");
        freed
    }

    /// A snapshot of the domain counters.
    pub fn stats(&self) -> DomainStats {
        DomainStats {
            generation: self.generation.load(Ordering::Relaxed),
            participants: self.registry.registered(),
            pending: self.retired.pending(),
            retired: self.retired_total.load(Ordering::Relaxed),
            reclaimed: self.reclaimed_total.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub(crate) fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Advances the global generation, returning the value it replaced.
    #[inline]
    pub(crate) fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst)
    }

    /// Tags `bag` with a fresh generation and moves it to the retired list.
    pub(crate) fn seal(&self, bag: &mut Bag) {
        if bag.is_empty() {
            return;
        }
        let mut sealed = bag.take();
        let generation = self.advance_generation();
        sealed.seal(generation);

        let len = sealed.len();
        self.retired_total.fetch_add(len as u64, Ordering::Relaxed);
        self.retired.push_bag(sealed);
        trace!(generation, len, "bag sealed");

        if self.retired.pending() >= self.trigger.load(Ordering::Relaxed) {
            self.try_reclaim();
        }
    }

    /// Blocks until every critical section active at the call has ended.
    ///
    /// Returns the generation waited past: every node sealed with a lower tag
    /// is unreachable by any participant once this returns.
    pub(crate) fn wait_for_readers(&self) -> u64 {
        let generation = self.advance_generation();
        fence(Ordering::SeqCst);
        self.registry.wait_past(generation);
        generation
    }

    #[cfg(test)]
    pub(crate) fn oldest_active(&self) -> Option<u64> {
        self.registry.oldest_active()
    }

    /// # Safety
    /// `slot` must come from this domain's registry and be released once.
    pub(crate) unsafe fn unregister(&self, slot: core::ptr::NonNull<super::participant::Slot>) {
        self.registry.release(slot);
        debug!(participants = self.registry.registered(), "participant unregistered");
    }
}

/// Exclusive right to drain the retired list.
struct ReclaimLock<'a>(&'a AtomicBool);

impl<'a> ReclaimLock<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self(flag))
    }

    fn acquire(flag: &'a AtomicBool) -> Self {
        let backoff = Backoff::new();
        loop {
            if let Some(lock) = Self::try_acquire(flag) {
                return lock;
            }
            backoff.snooze();
        }
    }
}

impl Drop for ReclaimLock<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl core::fmt::Debug for Domain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Domain")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn generation_starts_past_quiescent() {
        let domain = Domain::new();
        assert_eq!(domain.stats().generation, 1);
        assert_eq!(domain.advance_generation(), 1);
        assert_eq!(domain.current_generation(), 2);
    }

    #[test]
    fn reclaim_on_empty_domain_is_a_no_op() {
        let domain = Domain::new();
        assert_eq!(domain.try_reclaim(), 0);
        let stats = domain.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.reclaimed, 0);
    }

    #[test]
    fn register_tracks_participants() {
        let domain = Domain::new();
        let a = domain.register();
        let b = domain.register();
        assert_eq!(domain.stats().participants, 2);
        drop(a);
        assert_eq!(domain.stats().participants, 1);
        b.unregister();
        assert_eq!(domain.stats().participants, 0);
    }
}
