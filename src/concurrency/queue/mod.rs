//! The lock-free queue core.

pub mod error;
pub mod lf_queue;
pub(crate) mod node;

pub use error::PushError;
pub use lf_queue::LfQueue;
