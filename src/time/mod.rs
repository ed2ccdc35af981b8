//! Time primitives: clocks, the timer driver, and sleeping.
//!
//! Every delay in the crate goes through a [`TimerDriverHandle`], so the same
//! code runs against a [`WallClock`] or a deterministic [`VirtualClock`].

pub mod driver;
pub mod heap;
pub mod sleep;

pub use driver::{
    TimeSource, TimerDriver, TimerDriverApi, TimerDriverHandle, VirtualClock, WallClock,
};
pub use heap::{TimerHandle, TimerHeap};
pub use sleep::{Sleep, sleep, sleep_until};
