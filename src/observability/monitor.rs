//! The operation monitor.

use super::ledger::{AggregateStats, MetricLedger};
use super::measure::Measured;
use super::metrics::{OperationCounters, OperationMetrics};
use crate::Cx;
use crate::config::{ConfigError, MonitorConfig};
use crate::error::SettleResult;
use crate::tracing_compat::{debug, trace};
use crate::types::Outcome;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
struct OperationState {
    ledger: MetricLedger,
    metrics: OperationMetrics,
}

#[derive(Debug)]
struct MonitorInner {
    config: MonitorConfig,
    capacity: NonZeroUsize,
    operations: Mutex<BTreeMap<String, OperationState>>,
    /// Bumped by `clear`; read and written only under the `operations` lock.
    epoch: AtomicU64,
}

/// Records measured outcomes per named operation and aggregates them.
///
/// A `Monitor` is an explicit value: create one, clone it into whatever
/// records, and query it independently. Clones share state.
///
/// ```
/// use settle::observability::Monitor;
/// use settle::remote::SimulatedCall;
/// use settle::runtime::Runtime;
/// use std::time::Duration;
///
/// let runtime = Runtime::builder().seed(1).build();
/// let cx = runtime.cx();
/// let monitor = Monitor::new();
/// let call = SimulatedCall::new(Duration::from_millis(120), 1.0).unwrap();
///
/// let value = runtime
///     .block_on(monitor.measure(&cx, "fetch", || call.call(&cx, 7)))
///     .unwrap();
/// assert_eq!(value, 7);
///
/// let stats = monitor.stats("fetch").unwrap();
/// assert_eq!(stats.total, 1);
/// assert_eq!(stats.average_duration, Some(Duration::from_millis(120)));
/// ```
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.inner.config)
            .field("operations", &self.inner.operations.lock().len())
            .finish()
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    /// Creates a monitor with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_valid_config(MonitorConfig::default())
    }

    /// Creates a monitor with the given configuration.
    pub fn with_config(config: MonitorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: MonitorConfig) -> Self {
        let capacity = NonZeroUsize::new(config.ledger_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(MonitorInner {
                config,
                capacity,
                operations: Mutex::new(BTreeMap::new()),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> MonitorConfig {
        self.inner.config
    }

    /// Wraps an operation so its outcome is recorded under `name`.
    ///
    /// The start time is read immediately before `operation` is invoked.
    /// The returned future yields the operation's result unchanged and
    /// records exactly one outcome, even if it is dropped before settling.
    pub fn measure<F, Fut, T>(&self, cx: &Cx, name: impl Into<String>, operation: F) -> Measured<Fut>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SettleResult<T>>,
    {
        let name = name.into();
        let epoch = self.start(&name);
        let started = cx.now();
        let future = operation();
        Measured::new(future, self.clone(), name, epoch, cx.timer().clone(), started)
    }

    /// Records an outcome produced outside [`measure`](Self::measure).
    pub fn record(&self, name: &str, outcome: Outcome) {
        self.append(name, outcome, None);
    }

    /// Records the settle of a measured invocation started in `epoch`.
    pub(super) fn finish(&self, name: &str, outcome: Outcome, epoch: u64) {
        self.append(name, outcome, Some(epoch));
    }

    /// Counts a started invocation and returns the current epoch.
    fn start(&self, name: &str) -> u64 {
        let mut operations = self.inner.operations.lock();
        self.entry(&mut operations, name).metrics.start();
        self.inner.epoch.load(Ordering::Relaxed)
    }

    fn append(&self, name: &str, outcome: Outcome, started_in: Option<u64>) {
        debug!(
            operation = name,
            success = outcome.is_success(),
            duration_ms = outcome.duration_ms(),
            "outcome recorded"
        );
        let mut operations = self.inner.operations.lock();
        let current = self.inner.epoch.load(Ordering::Relaxed);
        let state = self.entry(&mut operations, name);
        // A start counted before the last clear is gone, so the settle
        // counts as a fresh call.
        if started_in == Some(current) {
            state.metrics.finish(&outcome);
        } else {
            state.metrics.record(&outcome);
        }
        if state.ledger.push(outcome).is_some() {
            trace!(
                operation = name,
                capacity = state.ledger.capacity(),
                "ledger entry evicted"
            );
        }
    }

    fn entry<'a>(
        &self,
        operations: &'a mut BTreeMap<String, OperationState>,
        name: &str,
    ) -> &'a mut OperationState {
        let capacity = self.inner.capacity;
        operations
            .entry(name.to_owned())
            .or_insert_with(|| OperationState {
                ledger: MetricLedger::new(capacity),
                metrics: OperationMetrics::new(),
            })
    }

    /// Statistics over the current ledger for `name`, or `None` if nothing
    /// has been recorded.
    #[must_use]
    pub fn stats(&self, name: &str) -> Option<AggregateStats> {
        let operations = self.inner.operations.lock();
        operations
            .get(name)
            .and_then(|state| state.ledger.stats(self.inner.config.recent_window))
    }

    /// Names of every operation with at least one recorded outcome, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let operations = self.inner.operations.lock();
        operations
            .iter()
            .filter(|(_, state)| !state.ledger.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of outcomes currently held for `name`.
    #[must_use]
    pub fn ledger_len(&self, name: &str) -> usize {
        self.inner
            .operations
            .lock()
            .get(name)
            .map_or(0, |state| state.ledger.len())
    }

    /// All-time counters for `name`.
    #[must_use]
    pub fn counters(&self, name: &str) -> Option<OperationCounters> {
        self.inner
            .operations
            .lock()
            .get(name)
            .map(|state| state.metrics.counters())
    }

    /// Discards every ledger and resets every counter.
    ///
    /// Measurements still in flight are recorded when they settle, as if
    /// started after the clear.
    pub fn clear(&self) {
        let mut operations = self.inner.operations.lock();
        let cleared = std::mem::take(&mut *operations);
        self.inner.epoch.fetch_add(1, Ordering::Relaxed);
        drop(operations);
        debug!(operations = cleared.len(), "monitor cleared");
        drop(cleared);
    }

    /// Human-readable dump of every operation.
    #[must_use]
    pub fn format_text(&self) -> String {
        use std::fmt::Write;
        let operations = self.inner.operations.lock();
        let mut s = String::new();
        for (name, state) in operations.iter() {
            let _ = writeln!(s, "# {name}");
            if let Some(stats) = state.ledger.stats(self.inner.config.recent_window) {
                let average = stats
                    .average_duration_ms()
                    .map_or_else(|| "n/a".to_owned(), |ms| format!("{ms:.2}ms"));
                let _ = writeln!(
                    s,
                    "ledger={}/{} success_rate={:.3} average={average}",
                    stats.total,
                    state.ledger.capacity(),
                    stats.success_rate,
                );
            }
            let _ = writeln!(s, "{}", state.metrics);
            s.push('\n');
        }
        s
    }

    /// JSON export: operation name to its stats and counters.
    pub fn snapshot_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        let operations = self.inner.operations.lock();
        let mut map = serde_json::Map::new();
        for (name, state) in operations.iter() {
            let Some(stats) = state.ledger.stats(self.inner.config.recent_window) else {
                continue;
            };
            let entry = serde_json::json!({
                "stats": serde_json::to_value(stats)?,
                "counters": serde_json::to_value(state.metrics.counters())?,
            });
            map.insert(name.clone(), entry);
        }
        Ok(serde_json::Value::Object(map))
    }
}
