//! Retry with exponential backoff.
//!
//! Attempts run strictly one after another. After failed attempt `i` the
//! combinator waits `initial_delay × backoff_multiplier^(i-1)` before attempt
//! `i + 1`, so the default policy (3 attempts, 100ms, ×2) waits 100ms and
//! then 200ms. Only the last failure is surfaced.
//!
//! ```
//! use settle::combinator::{RetryPolicy, retry_with_backoff};
//! use settle::{Failure, Runtime};
//! use std::time::Duration;
//!
//! let runtime = Runtime::new();
//! let cx = runtime.cx();
//! let policy = RetryPolicy::new(4, Duration::from_millis(10), 3.0).unwrap();
//! let mut calls = 0;
//! let result = runtime.block_on(retry_with_backoff(&cx, &policy, || {
//!     calls += 1;
//!     let attempt = calls;
//!     async move {
//!         if attempt < 3 { Err(Failure::simulated("flaky")) } else { Ok(attempt) }
//!     }
//! }));
//! assert_eq!(result, Ok(3));
//! // Waited 10ms after the first attempt and 30ms after the second.
//! assert_eq!(runtime.now().as_millis(), 40);
//! ```

use crate::Cx;
use crate::cancel::CancellationToken;
use crate::config::RetryPolicyConfig;
use crate::error::{ContractViolation, Failure, SettleResult};
use crate::tracing_compat::{debug, warn};
use std::future::Future;
use std::time::Duration;

/// An immutable, validated retry schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Creates a policy.
    ///
    /// `max_attempts` counts the first attempt and must be at least 1.
    /// `backoff_multiplier` must be finite and at least 1.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
    ) -> Result<Self, ContractViolation> {
        if max_attempts == 0 {
            return Err(ContractViolation::ZeroAttempts);
        }
        if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
            return Err(ContractViolation::InvalidBackoffMultiplier(
                backoff_multiplier,
            ));
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
        })
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Total attempts, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after the first failed attempt.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Growth factor between consecutive waits.
    #[must_use]
    pub const fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Wait after failed attempt `attempt` (1-based) before the next one.
    ///
    /// Attempt 0 has no preceding wait. Saturates instead of overflowing.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.powi(exponent);
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
        {
            let nanos = (self.initial_delay.as_nanos() as f64 * factor).round();
            if nanos >= u64::MAX as f64 {
                Duration::from_nanos(u64::MAX)
            } else {
                Duration::from_nanos(nanos as u64)
            }
        }
    }

    /// Sum of every wait when all attempts fail.
    #[must_use]
    pub fn total_delay(&self) -> Duration {
        (1..self.max_attempts).fold(Duration::ZERO, |total, attempt| {
            total.saturating_add(self.delay_after(attempt))
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }
}

impl TryFrom<RetryPolicyConfig> for RetryPolicy {
    type Error = ContractViolation;

    fn try_from(config: RetryPolicyConfig) -> Result<Self, Self::Error> {
        Self::new(
            config.max_attempts,
            config.initial_delay(),
            config.backoff_multiplier,
        )
    }
}

/// Wait after failed attempt `attempt` under `policy`.
#[must_use]
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    policy.delay_after(attempt)
}

/// Longest total wait `policy` can spend between attempts.
#[must_use]
pub fn total_delay_budget(policy: &RetryPolicy) -> Duration {
    policy.total_delay()
}

/// Runs `operation` until it succeeds or `policy` runs out of attempts.
///
/// Every failure is retried, cancellations included; the last failure is
/// surfaced.
pub async fn retry_with_backoff<T, F, Fut>(
    cx: &Cx,
    policy: &RetryPolicy,
    operation: F,
) -> SettleResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SettleResult<T>>,
{
    drive(cx, policy, None, operation).await
}

/// Like [`retry_with_backoff`], but stops as soon as `token` fires.
///
/// Attempts and backoff waits both run under `token`. A cancellation, or an
/// attempt that itself fails with [`Failure::Cancelled`], settles the retry
/// immediately with that cancellation.
pub async fn retry_with_cancel<T, F, Fut>(
    cx: &Cx,
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> SettleResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SettleResult<T>>,
{
    drive(cx, policy, Some(token), operation).await
}

async fn drive<T, F, Fut>(
    cx: &Cx,
    policy: &RetryPolicy,
    token: Option<&CancellationToken>,
    mut operation: F,
) -> SettleResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SettleResult<T>>,
{
    let mut attempt = 1;
    loop {
        debug!(attempt, max_attempts = policy.max_attempts, "retry attempt");
        let result = match token {
            Some(token) => token
                .run_until_cancelled(operation())
                .await
                .unwrap_or_else(|reason| Err(Failure::Cancelled(reason))),
            None => operation().await,
        };
        let failure = match result {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };

        if token.is_some() && failure.is_cancelled() {
            debug!(attempt, error = %failure, "retry stopped by cancellation");
            return Err(failure);
        }
        if attempt >= policy.max_attempts {
            warn!(attempts = attempt, error = %failure, "retry attempts exhausted");
            return Err(failure);
        }

        let delay = policy.delay_after(attempt);
        debug!(attempt, ?delay, error = %failure, "retry backing off");
        let backoff = cx.sleep(delay);
        if let Some(token) = token {
            if let Err(reason) = token.run_until_cancelled(backoff).await {
                debug!(attempt, "retry cancelled during backoff");
                return Err(Failure::Cancelled(reason));
            }
        } else {
            backoff.await;
        }
        attempt += 1;
    }
}
