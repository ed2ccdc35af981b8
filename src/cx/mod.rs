//! The capability context type.
//!
//! `Cx` is the token that grants access to runtime capabilities:
//! - reading the clock and sleeping,
//! - spawning background tasks,
//! - drawing entropy for simulated outcomes.
//!
//! Nothing in the crate reaches for a global clock, executor or RNG; every
//! effect flows through an explicit `Cx`. A `Cx` from a virtual-time runtime
//! therefore makes every delay and every random draw deterministic.

use crate::runtime::{JoinHandle, RuntimeHandle};
use crate::time::{Sleep, TimerDriverHandle};
use crate::types::Time;
use crate::util::EntropySource;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// The capability context for orchestrated operations.
///
/// Cheap to clone; clones share the same runtime, clock and entropy.
#[derive(Clone)]
pub struct Cx {
    runtime: RuntimeHandle,
    timer: TimerDriverHandle,
    entropy: Arc<dyn EntropySource>,
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("now", &self.now())
            .field("entropy", &self.entropy.source_id())
            .finish_non_exhaustive()
    }
}

impl Cx {
    pub(crate) fn new(
        runtime: RuntimeHandle,
        timer: TimerDriverHandle,
        entropy: Arc<dyn EntropySource>,
    ) -> Self {
        Self {
            runtime,
            timer,
            entropy,
        }
    }

    /// Returns a context that draws from `entropy` instead.
    #[must_use]
    pub fn with_entropy(&self, entropy: Arc<dyn EntropySource>) -> Self {
        Self {
            runtime: self.runtime.clone(),
            timer: self.timer.clone(),
            entropy,
        }
    }

    /// Current time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.timer.now()
    }

    /// The timer driver.
    #[must_use]
    pub fn timer(&self) -> &TimerDriverHandle {
        &self.timer
    }

    /// The runtime handle.
    #[must_use]
    pub fn runtime(&self) -> &RuntimeHandle {
        &self.runtime
    }

    /// The entropy source.
    #[must_use]
    pub fn entropy(&self) -> &Arc<dyn EntropySource> {
        &self.entropy
    }

    /// Spawns a detached background task.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }

    /// Sleeps for `duration`.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        crate::time::sleep(self, duration)
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::Runtime;
    use crate::util::ScriptedEntropy;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn clones_share_clock() {
        crate::test_utils::init_test_logging();
        crate::test_phase!("clones_share_clock");
        let runtime = Runtime::new();
        let cx = runtime.cx();
        let other = cx.clone();
        runtime.block_on(async {
            cx.sleep(Duration::from_millis(40)).await;
        });
        assert_eq!(other.now().as_millis(), 40);
        crate::test_complete!("clones_share_clock");
    }

    #[test]
    fn with_entropy_swaps_only_entropy() {
        crate::test_utils::init_test_logging();
        let runtime = Runtime::builder().seed(11).build();
        let cx = runtime.cx();
        let scripted = cx.with_entropy(Arc::new(ScriptedEntropy::new([0.25])));
        assert_eq!(cx.entropy().source_id(), "deterministic");
        assert_eq!(scripted.entropy().source_id(), "scripted");
        assert!(scripted.timer().ptr_eq(cx.timer()));
        assert!((scripted.entropy().next_f64() - 0.25).abs() < f64::EPSILON);
    }
}
