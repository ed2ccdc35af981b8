//! Settle: a small toolkit for orchestrating unreliable asynchronous calls.
//!
//! # Overview
//!
//! Settle runs futures on a single-threaded runtime with a pluggable clock and
//! gives them the pieces needed to coordinate flaky remote work: a simulated
//! remote service, cooperative cancellation, measurement into bounded
//! per-operation ledgers, and combinators (`race`, `all`, `any`,
//! `retry_with_backoff`, `timeout`).
//!
//! Every effect flows through an explicit [`Cx`]: spawning, sleeping, reading
//! the clock and drawing randomness. Under virtual time the runtime jumps the
//! clock to the next timer whenever every task is idle, so a 5-second
//! simulated call completes instantly and deterministically in tests.
//!
//! ```
//! use settle::{Monitor, Runtime, SimulatedCall, race};
//! use std::time::Duration;
//!
//! let runtime = Runtime::builder().seed(7).build();
//! let cx = runtime.cx();
//! let monitor = Monitor::new();
//!
//! let fast = SimulatedCall::new(Duration::from_millis(100), 1.0).unwrap();
//! let slow = SimulatedCall::new(Duration::from_millis(400), 1.0).unwrap();
//! let branches = vec![
//!     monitor.measure(&cx, "slow", || slow.call(&cx, "slow")),
//!     monitor.measure(&cx, "fast", || fast.call(&cx, "fast")),
//! ];
//! let winner = runtime.block_on(race(&cx, branches).unwrap());
//! assert_eq!(winner, Ok("fast"));
//! assert_eq!(runtime.now().as_millis(), 100);
//! ```
//!
//! # Module Structure
//!
//! - [`types`]: Core value types (time, cancellation reasons, outcomes)
//! - [`error`](mod@error): Failures, contract violations and runtime errors
//! - [`runtime`]: Single-threaded executor with virtual or wall-clock time
//! - [`cx`]: Capability context handed to every operation
//! - [`time`]: Clocks, the timer heap and sleep futures
//! - [`sync`]: Settle-once slot shared by producers and a single waiter
//! - [`cancel`]: Cancellation tokens with listeners and child tokens
//! - [`remote`]: Simulated remote calls
//! - [`observability`]: Measurement, ledgers, counters and aggregate stats
//! - [`combinator`]: Race, all, any, retry and timeout
//! - [`config`]: Toolkit configuration and validation
//! - [`util`]: Deterministic RNG and entropy sources
//! - [`tracing_compat`]: Optional tracing integration (requires `tracing-integration` feature)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod cancel;
pub mod combinator;
pub mod config;
pub mod cx;
pub mod error;
pub mod observability;
pub mod remote;
pub mod runtime;
pub mod sync;
pub mod time;
pub mod tracing_compat;
pub mod types;
pub mod util;

#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

pub use cancel::CancellationToken;
pub use combinator::{
    RetryPolicy, all, any, race, retry_with_backoff, retry_with_cancel, timeout,
};
pub use config::{ConfigError, MonitorConfig, RetryPolicyConfig, TimeMode, ToolkitConfig};
pub use cx::Cx;
pub use error::{
    AggregateFailure, ContractViolation, Failure, FailureKind, RuntimeError, SettleResult,
    SimulatedFailure,
};
pub use observability::{AggregateStats, Monitor};
pub use remote::SimulatedCall;
pub use runtime::{Runtime, RuntimeBuilder};
pub use types::{CancelKind, CancelReason, Outcome, Time};
