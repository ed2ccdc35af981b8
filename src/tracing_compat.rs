//! Optional `tracing` integration.
//!
//! With the `tracing-integration` feature the usual `tracing` macros are
//! re-exported. Without it, no-op macros are exported under the same names,
//! so instrumented call sites cost nothing and need no `cfg` of their own.
//!
//! The no-op macros carry private names and are renamed on import. A
//! `macro_rules! warn` re-exported under its own name is ambiguous with the
//! built-in `#[warn]` attribute.

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    macro_rules! noop_trace {
        ($($arg:tt)*) => {};
    }
    macro_rules! noop_debug {
        ($($arg:tt)*) => {};
    }
    macro_rules! noop_info {
        ($($arg:tt)*) => {};
    }
    macro_rules! noop_warn {
        ($($arg:tt)*) => {};
    }
    macro_rules! noop_error {
        ($($arg:tt)*) => {};
    }

    pub(crate) use noop_debug as debug;
    pub(crate) use noop_error as error;
    pub(crate) use noop_info as info;
    pub(crate) use noop_trace as trace;
    pub(crate) use noop_warn as warn;
}

#[cfg(not(feature = "tracing-integration"))]
#[allow(unused_imports)]
pub(crate) use noop::{debug, error, info, trace, warn};
