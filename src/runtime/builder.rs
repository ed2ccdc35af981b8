//! Runtime construction.

use super::{Runtime, RuntimeInner};
use crate::config::{RuntimeConfig, TimeMode};
use crate::time::{TimerDriverHandle, VirtualClock};
use crate::types::Time;
use crate::util::{DetEntropy, EntropySource, OsEntropy};
use std::fmt;
use std::sync::Arc;

/// Builder for [`Runtime`].
///
/// ```
/// use settle::runtime::RuntimeBuilder;
///
/// let runtime = RuntimeBuilder::new().seed(7).build();
/// assert!(runtime.virtual_clock().is_some());
/// ```
#[must_use]
pub struct RuntimeBuilder {
    time: TimeMode,
    seed: Option<u64>,
    entropy: Option<Arc<dyn EntropySource>>,
    start: Time,
}

impl fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("time", &self.time)
            .field("seed", &self.seed)
            .field("entropy", &self.entropy.as_ref().map(|e| e.source_id()))
            .field("start", &self.start)
            .finish()
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Starts from the defaults: virtual time at zero, OS entropy.
    pub fn new() -> Self {
        Self {
            time: TimeMode::Virtual,
            seed: None,
            entropy: None,
            start: Time::ZERO,
        }
    }

    /// Starts from a [`RuntimeConfig`].
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let builder = Self::new().time_mode(config.time);
        match config.seed {
            Some(seed) => builder.seed(seed),
            None => builder,
        }
    }

    /// Selects the time mode.
    pub const fn time_mode(mut self, mode: TimeMode) -> Self {
        self.time = mode;
        self
    }

    /// Shorthand for [`TimeMode::Virtual`].
    pub const fn virtual_time(self) -> Self {
        self.time_mode(TimeMode::Virtual)
    }

    /// Shorthand for [`TimeMode::Wall`].
    pub const fn wall_clock(self) -> Self {
        self.time_mode(TimeMode::Wall)
    }

    /// Uses deterministic entropy seeded with `seed`.
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Uses the given entropy source; overrides [`seed`](Self::seed).
    pub fn entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = Some(entropy);
        self
    }

    /// Initial virtual time. Ignored under wall-clock time.
    pub const fn start_time(mut self, start: Time) -> Self {
        self.start = start;
        self
    }

    /// Builds the runtime.
    #[must_use]
    pub fn build(self) -> Runtime {
        let (timer, clock) = match self.time {
            TimeMode::Virtual => {
                let clock = Arc::new(VirtualClock::starting_at(self.start));
                (
                    TimerDriverHandle::with_virtual_clock(Arc::clone(&clock)),
                    Some(clock),
                )
            }
            TimeMode::Wall => (TimerDriverHandle::with_wall_clock(), None),
        };
        let entropy: Arc<dyn EntropySource> = match (self.entropy, self.seed) {
            (Some(entropy), _) => entropy,
            (None, Some(seed)) => Arc::new(DetEntropy::new(seed)),
            (None, None) => Arc::new(OsEntropy),
        };
        Runtime::from_inner(RuntimeInner::new(self.time, timer, clock, entropy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_applies_mode_and_seed() {
        crate::test_utils::init_test_logging();
        crate::test_phase!("from_config_applies_mode_and_seed");
        let config = RuntimeConfig {
            time: TimeMode::Wall,
            seed: Some(3),
        };
        let runtime = RuntimeBuilder::from_config(&config).build();
        assert_eq!(runtime.time_mode(), TimeMode::Wall);
        assert!(runtime.virtual_clock().is_none());
        assert_eq!(runtime.cx().entropy().source_id(), "deterministic");
        crate::test_complete!("from_config_applies_mode_and_seed");
    }

    #[test]
    fn explicit_entropy_wins_over_seed() {
        crate::test_utils::init_test_logging();
        let runtime = RuntimeBuilder::new()
            .seed(1)
            .entropy(Arc::new(crate::util::ScriptedEntropy::new([0.5])))
            .build();
        assert_eq!(runtime.cx().entropy().source_id(), "scripted");
    }

    #[test]
    fn start_time_sets_virtual_origin() {
        crate::test_utils::init_test_logging();
        let runtime = RuntimeBuilder::new()
            .start_time(Time::from_secs(10))
            .build();
        assert_eq!(runtime.now(), Time::from_secs(10));
    }
}
