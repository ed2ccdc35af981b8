//! Measurement and aggregation of operation outcomes.
//!
//! - [`Monitor`]: explicit, shareable store of per-operation ledgers.
//! - [`Measured`]: the future returned by [`Monitor::measure`].
//! - [`MetricLedger`] and [`AggregateStats`]: the bounded outcome window and
//!   the statistics derived from it.
//! - [`metrics`]: all-time counters, the in-flight gauge and the latency
//!   histogram kept beside each ledger.

pub mod ledger;
pub mod measure;
pub mod metrics;
pub mod monitor;

pub use ledger::{AggregateStats, MetricLedger};
pub use measure::Measured;
pub use metrics::{Counter, Gauge, Histogram, OperationCounters, OperationMetrics};
pub use monitor::Monitor;
