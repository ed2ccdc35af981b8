//! Simulated remote calls.
//!
//! A [`SimulatedCall`] stands in for an unreliable service: each call waits
//! at least the configured delay and then succeeds with the configured
//! probability. The success draw is taken from the [`Cx`]'s entropy source at
//! settle time, so a seeded runtime replays the same sequence of outcomes.

use crate::Cx;
use crate::cancel::{CancellationToken, RunUntilCancelled};
use crate::error::{ContractViolation, Failure, SettleResult};
use crate::time::Sleep;
use crate::tracing_compat::trace;
use crate::util::EntropySource;
use pin_project::pin_project;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

const DEFAULT_FAILURE_MESSAGE: &str = "simulated service failure";

/// Converts a millisecond count to a [`Duration`].
///
/// Negative, NaN and infinite inputs are contract violations.
pub fn delay_from_millis(millis: f64) -> Result<Duration, ContractViolation> {
    if !millis.is_finite() || millis < 0.0 {
        return Err(ContractViolation::InvalidDelay(millis));
    }
    Duration::try_from_secs_f64(millis / 1000.0).map_err(|_| ContractViolation::InvalidDelay(millis))
}

/// A configured simulated remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedCall {
    delay: Duration,
    success_probability: f64,
    failure_message: Arc<str>,
}

impl SimulatedCall {
    /// Creates a simulated call.
    ///
    /// `success_probability` must lie in `[0, 1]`.
    pub fn new(delay: Duration, success_probability: f64) -> Result<Self, ContractViolation> {
        if !(0.0..=1.0).contains(&success_probability) {
            return Err(ContractViolation::ProbabilityOutOfRange(success_probability));
        }
        Ok(Self {
            delay,
            success_probability,
            failure_message: Arc::from(DEFAULT_FAILURE_MESSAGE),
        })
    }

    /// Creates a simulated call from a delay in milliseconds.
    pub fn from_millis(delay_ms: f64, success_probability: f64) -> Result<Self, ContractViolation> {
        Self::new(delay_from_millis(delay_ms)?, success_probability)
    }

    /// Sets the message carried by simulated failures.
    #[must_use]
    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Arc::from(message.into());
        self
    }

    /// The minimum time before a call settles.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Probability that a call succeeds.
    #[must_use]
    pub const fn success_probability(&self) -> f64 {
        self.success_probability
    }

    /// Issues a call that settles with `payload` or a simulated failure.
    pub fn call<T>(&self, cx: &Cx, payload: T) -> SimulatedResponse<T> {
        SimulatedResponse {
            sleep: cx.sleep(self.delay),
            payload: Some(payload),
            entropy: Arc::clone(cx.entropy()),
            success_probability: self.success_probability,
            failure_message: Arc::clone(&self.failure_message),
        }
    }

    /// Issues a call that settles as [`Failure::Cancelled`] if `token` fires
    /// before the delay elapses.
    pub fn call_with_cancel<T>(
        &self,
        cx: &Cx,
        payload: T,
        token: &CancellationToken,
    ) -> CancellableResponse<T> {
        CancellableResponse {
            inner: token.run_until_cancelled(self.call(cx, payload)),
        }
    }
}

/// Future returned by [`SimulatedCall::call`].
#[pin_project]
#[must_use = "futures do nothing unless polled"]
pub struct SimulatedResponse<T> {
    sleep: Sleep,
    payload: Option<T>,
    entropy: Arc<dyn EntropySource>,
    success_probability: f64,
    failure_message: Arc<str>,
}

impl<T> fmt::Debug for SimulatedResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedResponse")
            .field("deadline", &self.sleep.deadline())
            .field("settled", &self.payload.is_none())
            .field("success_probability", &self.success_probability)
            .finish_non_exhaustive()
    }
}

impl<T> Future for SimulatedResponse<T> {
    type Output = SettleResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if this.payload.is_none() {
            // Already settled; a settled call never settles again.
            return Poll::Pending;
        }
        if Pin::new(&mut *this.sleep).poll(cx).is_pending() {
            return Poll::Pending;
        }
        let draw = this.entropy.next_f64();
        let succeeded = draw < *this.success_probability;
        trace!(
            draw,
            success_probability = *this.success_probability,
            succeeded,
            "simulated call settled"
        );
        let Some(payload) = this.payload.take() else {
            return Poll::Pending;
        };
        if succeeded {
            Poll::Ready(Ok(payload))
        } else {
            Poll::Ready(Err(Failure::simulated(this.failure_message.to_string())))
        }
    }
}

/// Future returned by [`SimulatedCall::call_with_cancel`].
#[pin_project]
#[must_use = "futures do nothing unless polled"]
pub struct CancellableResponse<T> {
    #[pin]
    inner: RunUntilCancelled<SimulatedResponse<T>>,
}

impl<T> fmt::Debug for CancellableResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellableResponse").finish_non_exhaustive()
    }
}

impl<T> Future for CancellableResponse<T> {
    type Output = SettleResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().inner.poll(cx).map(|result| match result {
            Ok(settled) => settled,
            Err(reason) => Err(Failure::Cancelled(reason)),
        })
    }
}
