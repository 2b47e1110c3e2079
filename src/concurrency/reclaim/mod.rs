//! Deferred memory reclamation.
//!
//! A [`Domain`] lets lock-free structures unlink nodes immediately but free
//! them only once no participant can still hold a reference:
//!
//! 1. Each thread registers once ([`Domain::register`]) and receives a
//!    [`Handle`].
//! 2. Every access to shared nodes happens inside a critical section
//!    ([`Handle::pin`] → [`Guard`]).
//! 3. Unlinked nodes are retired through the handle, tagged with a generation
//!    in batches, and released by reclaim passes once every active participant
//!    has re-entered since that generation.
//!
//! ```
//! use rcu_lfq::Domain;
//!
//! let domain = Domain::new();
//! let handle = domain.register();
//! {
//!     let _guard = handle.pin();
//!     // read shared nodes here
//! }
//! handle.synchronize();
//! assert_eq!(domain.stats().pending, 0);
//! ```

pub mod config;
pub mod domain;
pub mod handle;
pub(crate) mod participant;
pub(crate) mod retired;

pub use config::ReclaimConfig;
pub use domain::{Domain, DomainStats};
pub use handle::{Guard, Handle};
