//! Bounded outcome ledger and the statistics derived from it.

use crate::error::ContractViolation;
use crate::types::Outcome;
use serde::Serialize;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::Duration;

/// The most recent outcomes of one operation, oldest first.
///
/// Holds at most `capacity` entries; recording into a full ledger evicts the
/// oldest entry.
#[derive(Debug, Clone)]
pub struct MetricLedger {
    entries: VecDeque<Outcome>,
    capacity: usize,
}

impl MetricLedger {
    /// Creates an empty ledger holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.get()),
            capacity: capacity.get(),
        }
    }

    /// Creates an empty ledger, rejecting a zero capacity.
    pub fn with_capacity(capacity: usize) -> Result<Self, ContractViolation> {
        NonZeroUsize::new(capacity)
            .map(Self::new)
            .ok_or(ContractViolation::ZeroCapacity {
                what: "ledger capacity",
            })
    }

    /// Appends an outcome, returning the evicted entry if the ledger was full.
    pub fn push(&mut self, outcome: Outcome) -> Option<Outcome> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(outcome);
        evicted
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Outcome> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Discards every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Aggregates the current entries, or `None` if there are none.
    #[must_use]
    pub fn stats(&self, recent_window: usize) -> Option<AggregateStats> {
        if self.entries.is_empty() {
            return None;
        }
        let total = self.entries.len();
        let mut successes = 0usize;
        let mut success_time = Duration::ZERO;
        for outcome in &self.entries {
            if outcome.is_success() {
                successes += 1;
                success_time = success_time.saturating_add(outcome.duration());
            }
        }
        let average_duration = u32::try_from(successes)
            .ok()
            .filter(|&n| n > 0)
            .map(|n| success_time / n);
        let skip = total.saturating_sub(recent_window);
        #[allow(clippy::cast_precision_loss)]
        let success_rate = successes as f64 / total as f64;
        Some(AggregateStats {
            total,
            successes,
            failures: total - successes,
            success_rate,
            average_duration,
            recent: self.entries.iter().skip(skip).cloned().collect(),
        })
    }
}

/// Rolling statistics over one operation's ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStats {
    /// Entries in the ledger.
    pub total: usize,
    /// Successful entries.
    pub successes: usize,
    /// Failed entries, cancellations included.
    pub failures: usize,
    /// `successes / total`, within `[0, 1]`.
    pub success_rate: f64,
    /// Mean duration of successful entries; `None` when there are none.
    #[serde(rename = "average_duration_ms", serialize_with = "serialize_opt_millis")]
    pub average_duration: Option<Duration>,
    /// The most recent entries, oldest first.
    pub recent: Vec<Outcome>,
}

impl AggregateStats {
    /// Average success duration in fractional milliseconds.
    #[must_use]
    pub fn average_duration_ms(&self) -> Option<f64> {
        self.average_duration.map(|d| d.as_secs_f64() * 1000.0)
    }
}

fn serialize_opt_millis<S: serde::Serializer>(
    value: &Option<Duration>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => s.serialize_some(&(d.as_secs_f64() * 1000.0)),
        None => s.serialize_none(),
    }
}
