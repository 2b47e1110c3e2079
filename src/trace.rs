//! Tracing hooks for the reclamation domain.
//!
//! Enable with `--features tracing`. Without the feature every macro below
//! expands to nothing, so push/pop and the reclaim path pay no cost.

/// Installs a `tracing-subscriber` formatter filtered by `RUST_LOG`.
///
/// Defaults to `rcu_lfq=trace` when `RUST_LOG` is unset. Safe to call more than
/// once; later calls are ignored. Does nothing without the `tracing` feature.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rcu_lfq=trace"));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .try_init();
}

/// Installs a `tracing-subscriber` formatter filtered by `RUST_LOG`.
///
/// No-op: the crate was built without the `tracing` feature.
#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, trace};

#[cfg(not(feature = "tracing"))]
macro_rules! trace_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use debug_noop as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use trace_noop as trace;
