//! # `rcu-lfq` - Lock-Free Queue with Deferred Reclamation
//!
//! An unbounded multi-producer/multi-consumer FIFO queue that never takes a
//! lock on push or pop, paired with a generation-based reclamation domain that
//! frees unlinked nodes only once no thread can still be dereferencing them.
//!
//! ## Safety Guarantees
//!
//! ### Memory Safety
//! - **No use-after-free**: a node popped by one thread is retired, not freed;
//!   it is released only after every critical section that could have observed
//!   it has ended.
//! - **Explicit ownership transfer**: `push` moves the value into the queue,
//!   `pop` moves it back out, and dropping the queue drops whatever is left.
//! - **No ABA on the chain**: node memory is never reused while any reader can
//!   still hold it, so a stale pointer can never match a recycled one.
//!
//! ### Concurrency Safety
//! - **Lock-free progress**: push and pop retry on CAS contention but never
//!   wait for another thread.
//! - **FIFO linearizability**: values leave in the order their tail appends
//!   succeeded.
//! - **Registration by construction**: every queue operation needs a
//!   [`Handle`], so no thread can touch nodes without taking part in
//!   grace-period accounting.
//!
//! ## Architecture
//!
//! 1. **Queue core** ([`LfQueue`]):
//!    - Michael–Scott linked queue with a rotating sentinel
//!    - Cache-padded `head`/`tail`, helping on a lagging tail
//!
//! 2. **Reclamation** ([`Domain`], [`Handle`], [`Guard`]):
//!    - Per-participant entry generations, published on pin
//!    - Per-handle bags of retired nodes, sealed with one generation bump
//!    - Reclaim passes that free every node all active readers have moved past
//!
//! 3. **Allocation seam** ([`NodeAlloc`]):
//!    - Global heap by default, pluggable for budgets or fault injection
//!
//! ## Example
//!
//! ```rust
//! use rcu_lfq::{Domain, LfQueue};
//!
//! let domain = Domain::new();
//! let queue = LfQueue::new(domain.clone());
//!
//! std::thread::scope(|s| {
//!     s.spawn(|| {
//!         let handle = domain.register();
//!         for i in 0..100 {
//!             queue.push(&handle, i).unwrap();
//!         }
//!     });
//! });
//!
//! let handle = domain.register();
//! let drained: Vec<i32> = std::iter::from_fn(|| queue.pop(&handle)).collect();
//! assert_eq!(drained, (0..100).collect::<Vec<_>>());
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod alloc;
pub mod concurrency;
pub mod trace;

mod sync;

pub use alloc::{AllocError, Global, NodeAlloc};
pub use concurrency::{Domain, DomainStats, Guard, Handle, LfQueue, PushError, ReclaimConfig};
pub use trace::init_tracing;

// Compile-time layout checks.
const _: () = {
    use core::mem;

    // A guard is a single borrow of its handle.
    assert!(mem::size_of::<Guard<'static>>() == mem::size_of::<usize>());

    // Head and tail live on separate cache lines.
    assert!(mem::size_of::<LfQueue<u64>>() >= 2 * mem::align_of::<crossbeam_utils::CachePadded<u8>>());
};
