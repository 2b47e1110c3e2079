//! Lock-free structures and the reclamation domain they retire into.
//!
//! Important: a [`Handle`](reclaim::Handle) is what makes a thread visible to
//! grace-period accounting. Queue operations cannot run without one, so a
//! node can never be freed under a thread that is still reading it.

pub mod queue;
pub mod reclaim;

pub use queue::{LfQueue, PushError};
pub use reclaim::{Domain, DomainStats, Guard, Handle, ReclaimConfig};
