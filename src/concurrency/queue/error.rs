//! Errors surfaced by queue operations.

use crate::alloc::AllocError;

/// A push that could not allocate its node.
///
/// The queue is left untouched and ownership of the value returns to the
/// caller through [`PushError::into_inner`].
pub struct PushError<T> {
    value: T,
    cause: AllocError,
}

impl<T> PushError<T> {
    pub(crate) fn new(value: T, cause: AllocError) -> Self {
        Self { value, cause }
    }

    /// The value that was not enqueued.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Recovers the value that was not enqueued.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// The underlying allocation failure.
    pub fn cause(&self) -> AllocError {
        self.cause
    }
}

impl<T> core::fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PushError")
            .field("cause", &self.cause)
            .finish_non_exhaustive()
    }
}

impl<T> core::fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("failed to allocate a queue node")
    }
}

impl<T> std::error::Error for PushError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}
