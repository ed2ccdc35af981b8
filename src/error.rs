//! Error types.
//!
//! Two families of errors exist and they never mix:
//!
//! - [`Failure`] is how an operation *settles* when it does not succeed. It is
//!   always delivered through the future's output, is recorded by the
//!   [`Monitor`](crate::observability::Monitor), and may be retried.
//! - [`ContractViolation`] reports malformed input. It is returned
//!   synchronously from constructors and combinator entry points, is never
//!   retried, and never reaches a metrics ledger.

use crate::types::{CancelKind, CancelReason};
use core::fmt;
use serde::Serialize;
use thiserror::Error;

/// Result of a settled operation.
pub type SettleResult<T> = Result<T, Failure>;

/// The discriminant of a [`Failure`], for callers that branch on kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The simulated remote service failed.
    Simulated,
    /// A cancellation token fired before the operation settled.
    Cancelled,
    /// Every branch of an `any` combinator failed.
    Aggregate,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulated => write!(f, "simulated"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Aggregate => write!(f, "aggregate"),
        }
    }
}

/// The probabilistic failure outcome of a simulated remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct SimulatedFailure {
    /// Human-readable description of what failed.
    pub message: String,
}

impl SimulatedFailure {
    /// Creates a simulated failure with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Produced by `any` when every branch failed.
///
/// `reasons[i]` is the failure of input branch `i`, regardless of the order
/// in which the branches failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateFailure {
    reasons: Vec<Failure>,
}

impl AggregateFailure {
    /// Creates an aggregate failure from reasons already in input order.
    #[must_use]
    pub fn new(reasons: Vec<Failure>) -> Self {
        Self { reasons }
    }

    /// The individual failures, in input order.
    #[must_use]
    pub fn reasons(&self) -> &[Failure] {
        &self.reasons
    }

    /// Consumes the aggregate and returns the individual failures.
    #[must_use]
    pub fn into_reasons(self) -> Vec<Failure> {
        self.reasons
    }

    /// Number of failed branches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    /// True when the aggregate was built from zero branches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all {} branches failed", self.reasons.len())?;
        for (index, reason) in self.reasons.iter().enumerate() {
            write!(f, "; [{index}] {reason}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {}

/// How an operation failed to produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Failure {
    /// The simulated service failed.
    #[error("simulated failure: {0}")]
    Simulated(SimulatedFailure),
    /// The operation was cancelled before it settled.
    #[error("cancelled ({0})")]
    Cancelled(CancelReason),
    /// Every branch of an `any` failed.
    #[error("{0}")]
    Aggregate(AggregateFailure),
}

impl Failure {
    /// Creates a simulated failure.
    #[must_use]
    pub fn simulated(message: impl Into<String>) -> Self {
        Self::Simulated(SimulatedFailure::new(message))
    }

    /// Creates a cancellation failure.
    #[must_use]
    pub const fn cancelled(reason: CancelReason) -> Self {
        Self::Cancelled(reason)
    }

    /// Returns the failure kind.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Simulated(_) => FailureKind::Simulated,
            Self::Cancelled(_) => FailureKind::Cancelled,
            Self::Aggregate(_) => FailureKind::Aggregate,
        }
    }

    /// Returns true for [`Failure::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns the cancellation reason, if this is a cancellation.
    #[must_use]
    pub const fn cancel_reason(&self) -> Option<&CancelReason> {
        match self {
            Self::Cancelled(reason) => Some(reason),
            _ => None,
        }
    }

    /// Returns the cancellation kind, if this is a cancellation.
    #[must_use]
    pub fn cancel_kind(&self) -> Option<CancelKind> {
        self.cancel_reason().map(CancelReason::kind)
    }
}

impl From<SimulatedFailure> for Failure {
    fn from(value: SimulatedFailure) -> Self {
        Self::Simulated(value)
    }
}

impl From<CancelReason> for Failure {
    fn from(value: CancelReason) -> Self {
        Self::Cancelled(value)
    }
}

impl From<AggregateFailure> for Failure {
    fn from(value: AggregateFailure) -> Self {
        Self::Aggregate(value)
    }
}

/// A malformed input, reported synchronously and never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractViolation {
    /// A delay was negative, NaN, or infinite.
    #[error("delay must be a finite, non-negative number of milliseconds (got {0})")]
    InvalidDelay(f64),
    /// A success probability was outside `[0, 1]` or NaN.
    #[error("success probability must be within [0, 1] (got {0})")]
    ProbabilityOutOfRange(f64),
    /// A retry policy allowed zero attempts.
    #[error("retry policy needs at least one attempt")]
    ZeroAttempts,
    /// A backoff multiplier was below 1, NaN, or infinite.
    #[error("backoff multiplier must be finite and at least 1 (got {0})")]
    InvalidBackoffMultiplier(f64),
    /// `race` was given no branches and would never settle.
    #[error("race needs at least one branch")]
    EmptyRace,
    /// A size limit was zero.
    #[error("{what} must be at least 1")]
    ZeroCapacity {
        /// The offending setting.
        what: &'static str,
    },
}

/// Failures of the executor itself, as opposed to the operations it runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Under virtual time, the root future was pending with no runnable task
    /// and no timer left to fire, so it could never complete.
    #[error("runtime stalled: root future pending with {pending_tasks} idle tasks and no timers")]
    Stalled {
        /// Spawned tasks still alive when the stall was detected.
        pending_tasks: usize,
    },
}
