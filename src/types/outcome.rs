//! Settled outcomes of measured operations.

use super::Time;
use crate::error::{Failure, SettleResult};
use serde::Serialize;
use std::time::Duration;

/// How a measured operation settled, when, and how long it took.
///
/// Outcomes are created at the instant an operation settles and are never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T = ()> {
    /// The operation produced a value.
    Success {
        /// The produced value.
        value: T,
        /// Time from invocation to settle.
        #[serde(with = "duration_millis")]
        duration: Duration,
        /// Settle instant.
        timestamp: Time,
    },
    /// The operation failed or was cancelled.
    Failure {
        /// Why it failed.
        error: Failure,
        /// Time from invocation to settle.
        #[serde(with = "duration_millis")]
        duration: Duration,
        /// Settle instant.
        timestamp: Time,
    },
}

impl<T> Outcome<T> {
    /// Builds an outcome from a settled result.
    #[must_use]
    pub fn from_result(result: SettleResult<T>, duration: Duration, timestamp: Time) -> Self {
        match result {
            Ok(value) => Self::Success {
                value,
                duration,
                timestamp,
            },
            Err(error) => Self::Failure {
                error,
                duration,
                timestamp,
            },
        }
    }

    /// Returns true for [`Outcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Time from invocation to settle.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        match self {
            Self::Success { duration, .. } | Self::Failure { duration, .. } => *duration,
        }
    }

    /// Duration in fractional milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        self.duration().as_secs_f64() * 1000.0
    }

    /// Settle instant.
    #[must_use]
    pub const fn timestamp(&self) -> Time {
        match self {
            Self::Success { timestamp, .. } | Self::Failure { timestamp, .. } => *timestamp,
        }
    }

    /// The failure, if the operation did not succeed.
    #[must_use]
    pub const fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure { error, .. } => Some(error),
            Self::Success { .. } => None,
        }
    }

    /// Drops the success value, keeping timing and failure details.
    #[must_use]
    pub fn discard_value(self) -> Outcome<()> {
        match self {
            Self::Success {
                duration,
                timestamp,
                ..
            } => Outcome::Success {
                value: (),
                duration,
                timestamp,
            },
            Self::Failure {
                error,
                duration,
                timestamp,
            } => Outcome::Failure {
                error,
                duration,
                timestamp,
            },
        }
    }

    /// Converts back into the settled result.
    pub fn into_result(self) -> SettleResult<T> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::Failure { error, .. } => Err(error),
        }
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(value.as_secs_f64() * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CancelReason;

    #[test]
    fn from_result_keeps_timing() {
        let ok = Outcome::from_result(Ok(7), Duration::from_millis(40), Time::from_millis(90));
        assert!(ok.is_success());
        assert_eq!(ok.duration(), Duration::from_millis(40));
        assert_eq!(ok.timestamp(), Time::from_millis(90));
        assert_eq!(ok.into_result(), Ok(7));
    }

    #[test]
    fn discard_value_preserves_failure() {
        let failed: Outcome<u32> = Outcome::from_result(
            Err(Failure::cancelled(CancelReason::timeout())),
            Duration::from_millis(5),
            Time::from_millis(5),
        );
        let erased = failed.discard_value();
        assert!(!erased.is_success());
        assert!(erased.failure().is_some_and(Failure::is_cancelled));
    }

    #[test]
    fn serializes_duration_as_millis() {
        let ok = Outcome::from_result(Ok(()), Duration::from_micros(1500), Time::ZERO);
        let json = serde_json::to_value(&ok).expect("serialize");
        assert_eq!(json["status"], "success");
        assert_eq!(json["duration"], 1.5);
    }
}
