//! Synchronization primitives.

pub mod settle;

pub use settle::{SettleOnce, Settled};
