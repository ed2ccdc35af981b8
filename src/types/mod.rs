//! Core types shared across the toolkit.
//!
//! - [`time`](mod@time): the `Time` instant
//! - [`cancel`]: cancellation reason and kind types
//! - [`outcome`]: settled outcomes recorded by the monitor

pub mod cancel;
pub mod outcome;
pub mod time;

pub use cancel::{CancelKind, CancelReason};
pub use outcome::Outcome;
pub use time::Time;
