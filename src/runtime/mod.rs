//! Single-threaded cooperative executor.
//!
//! The runtime owns a FIFO ready queue of spawned tasks and a timer driver.
//! [`Runtime::block_on`] drives a root future on the calling thread; while it
//! runs, spawned tasks make progress in the order they were woken.
//!
//! When nothing is runnable the runtime waits for the next timer:
//!
//! - under [`TimeMode::Virtual`] it jumps the virtual clock straight to the
//!   next deadline, so a 5 second sleep completes instantly and
//!   deterministically;
//! - under [`TimeMode::Wall`] it parks the thread until that deadline.
//!
//! Timers sharing a deadline fire in registration order, and woken tasks run
//! in wake order. Together with spawn order this gives combinators a stable
//! tie-break.
//!
//! Dropping the [`Runtime`] drops every task that has not finished.

mod builder;
mod join_handle;
mod stored_task;
mod yield_now;

pub use builder::RuntimeBuilder;
pub use join_handle::JoinHandle;
pub use yield_now::{YieldNow, yield_now};

use crate::Cx;
use crate::config::TimeMode;
use crate::error::RuntimeError;
use crate::sync::SettleOnce;
use crate::time::{TimerDriverHandle, VirtualClock};
use crate::tracing_compat::{debug, trace};
use crate::types::Time;
use crate::util::EntropySource;
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use slab::Slab;
use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};
use stored_task::{StoredTask, TaskSlot, TaskWaker};

/// State shared by the runtime, its handles, and task wakers.
pub(crate) struct RuntimeInner {
    mode: TimeMode,
    tasks: Mutex<Slab<TaskSlot>>,
    ready: SegQueue<usize>,
    timer: TimerDriverHandle,
    clock: Option<Arc<VirtualClock>>,
    entropy: Arc<dyn EntropySource>,
    driver_thread: Mutex<Option<Thread>>,
}

impl RuntimeInner {
    pub(crate) fn new(
        mode: TimeMode,
        timer: TimerDriverHandle,
        clock: Option<Arc<VirtualClock>>,
        entropy: Arc<dyn EntropySource>,
    ) -> Self {
        Self {
            mode,
            tasks: Mutex::new(Slab::new()),
            ready: SegQueue::new(),
            timer,
            clock,
            entropy,
            driver_thread: Mutex::new(None),
        }
    }

    /// Queues a task and wakes the driving thread.
    pub(crate) fn enqueue(&self, key: usize) {
        self.ready.push(key);
        if let Some(thread) = self.driver_thread.lock().as_ref() {
            thread.unpark();
        }
    }

    fn spawn_stored(self: &Arc<Self>, task: StoredTask) {
        let key = {
            let mut tasks = self.tasks.lock();
            let entry = tasks.vacant_entry();
            let key = entry.key();
            let waker = Arc::new(TaskWaker::new(key, Arc::downgrade(self)));
            waker.scheduled.store(true, Ordering::Release);
            entry.insert(TaskSlot {
                task: Some(task),
                waker,
            });
            key
        };
        trace!(task = key, "task spawned");
        self.enqueue(key);
    }

    /// Polls one task. The future is taken out of the slab while it runs so
    /// that it can spawn without deadlocking.
    fn poll_task(&self, key: usize) {
        let (mut task, waker) = {
            let mut tasks = self.tasks.lock();
            let Some(slot) = tasks.get_mut(key) else {
                return;
            };
            let Some(task) = slot.task.take() else {
                return;
            };
            (task, Arc::clone(&slot.waker))
        };
        waker.scheduled.store(false, Ordering::Release);
        let std_waker = Waker::from(waker);
        let mut cx = Context::from_waker(&std_waker);
        match task.poll(&mut cx) {
            Poll::Ready(()) => {
                let slot = self.tasks.lock().try_remove(key);
                trace!(task = key, "task finished");
                // Dropped outside the lock.
                drop(slot);
                drop(task);
            }
            Poll::Pending => {
                if let Some(slot) = self.tasks.lock().get_mut(key) {
                    slot.task = Some(task);
                }
            }
        }
    }

    /// Polls the tasks queued when the batch started. Returns how many ran.
    fn run_ready_batch(&self) -> usize {
        let budget = self.ready.len();
        let mut polled = 0;
        while polled < budget {
            let Some(key) = self.ready.pop() else {
                break;
            };
            self.poll_task(key);
            polled += 1;
        }
        polled
    }

    /// Waits for the next timer while idle. Returns false when nothing can
    /// ever become runnable again.
    fn idle_wait(&self) -> bool {
        let next = self.timer.next_deadline();
        match (self.mode, next) {
            (TimeMode::Virtual, Some(deadline)) => match &self.clock {
                Some(clock) if !clock.is_paused() => {
                    trace!(to = %deadline, "advancing virtual time");
                    clock.advance_to(deadline);
                    true
                }
                _ => false,
            },
            (TimeMode::Virtual, None) => false,
            (TimeMode::Wall, Some(deadline)) => {
                let now = self.timer.now();
                if deadline > now {
                    thread::park_timeout(deadline.elapsed_since(now));
                }
                true
            }
            (TimeMode::Wall, None) => {
                thread::park();
                true
            }
        }
    }

    fn pending_tasks(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl fmt::Debug for RuntimeInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeInner")
            .field("mode", &self.mode)
            .field("tasks", &self.pending_tasks())
            .field("ready", &self.ready.len())
            .field("timer", &self.timer)
            .field("entropy", &self.entropy.source_id())
            .finish_non_exhaustive()
    }
}

struct RootWaker {
    woken: AtomicBool,
    thread: Thread,
}

impl Wake for RootWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.woken.store(true, Ordering::Release);
        self.thread.unpark();
    }
}

/// A single-threaded cooperative runtime.
///
/// ```
/// use settle::runtime::Runtime;
/// use settle::time::sleep;
/// use std::time::Duration;
///
/// let runtime = Runtime::new();
/// let cx = runtime.cx();
/// runtime.block_on(async {
///     sleep(&cx, Duration::from_secs(5)).await;
/// });
/// assert_eq!(runtime.now().as_millis(), 5_000);
/// ```
#[derive(Debug)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Creates a runtime with the default settings (virtual time).
    #[must_use]
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    /// Returns a builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    fn from_inner(inner: RuntimeInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Returns a cloneable handle for spawning tasks.
    #[must_use]
    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns a capability context bound to this runtime.
    #[must_use]
    pub fn cx(&self) -> Cx {
        self.handle().cx()
    }

    /// Current time on the runtime's clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.inner.timer.now()
    }

    /// The configured time mode.
    #[must_use]
    pub fn time_mode(&self) -> TimeMode {
        self.inner.mode
    }

    /// The virtual clock, under [`TimeMode::Virtual`].
    #[must_use]
    pub fn virtual_clock(&self) -> Option<&Arc<VirtualClock>> {
        self.inner.clock.as_ref()
    }

    /// Number of spawned tasks that have not finished.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.inner.pending_tasks()
    }

    /// Runs `future` to completion, driving spawned tasks and timers.
    ///
    /// # Panics
    ///
    /// Panics if the runtime stalls; see [`try_block_on`](Self::try_block_on).
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        match self.try_block_on(future) {
            Ok(output) => output,
            Err(err) => panic!("{err}"),
        }
    }

    /// Runs `future` to completion, driving spawned tasks and timers.
    ///
    /// Under virtual time, returns [`RuntimeError::Stalled`] if the future is
    /// still pending when no task is runnable and no timer is left to fire.
    /// Must not be called from inside a task.
    pub fn try_block_on<F: Future>(&self, future: F) -> Result<F::Output, RuntimeError> {
        let mut root = pin!(future);
        let root_waker = Arc::new(RootWaker {
            woken: AtomicBool::new(true),
            thread: thread::current(),
        });
        let waker = Waker::from(Arc::clone(&root_waker));
        let mut cx = Context::from_waker(&waker);
        *self.inner.driver_thread.lock() = Some(thread::current());

        loop {
            if root_waker.woken.swap(false, Ordering::AcqRel) {
                if let Poll::Ready(output) = root.as_mut().poll(&mut cx) {
                    return Ok(output);
                }
            }
            let polled = self.inner.run_ready_batch();
            let fired = self.inner.timer.process_timers();
            if polled > 0
                || fired > 0
                || root_waker.woken.load(Ordering::Acquire)
                || !self.inner.ready.is_empty()
            {
                continue;
            }
            if !self.inner.idle_wait() {
                let pending_tasks = self.inner.pending_tasks();
                debug!(pending_tasks, "runtime stalled");
                return Err(RuntimeError::Stalled { pending_tasks });
            }
        }
    }

    /// Drives spawned tasks until none is runnable and no timer is pending.
    ///
    /// Detached work, such as the losing branches of a race, runs to
    /// completion here.
    pub fn run_until_idle(&self) {
        *self.inner.driver_thread.lock() = Some(thread::current());
        loop {
            let polled = self.inner.run_ready_batch();
            let fired = self.inner.timer.process_timers();
            if polled > 0 || fired > 0 || !self.inner.ready.is_empty() {
                continue;
            }
            if self.inner.timer.next_deadline().is_none() || !self.inner.idle_wait() {
                break;
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Tasks hold handles back to the runtime; clearing them breaks the cycle.
        let tasks = std::mem::take(&mut *self.inner.tasks.lock());
        if !tasks.is_empty() {
            debug!(count = tasks.len(), "dropping unfinished tasks");
        }
        drop(tasks);
    }
}

/// A cloneable handle to a [`Runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    inner: Arc<RuntimeInner>,
}

impl RuntimeHandle {
    /// Spawns a detached task, returning a handle to its output.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let slot = SettleOnce::new();
        let sender = slot.clone();
        self.inner.spawn_stored(StoredTask::new(async move {
            let _ = sender.settle(future.await);
        }));
        JoinHandle::new(slot)
    }

    /// Current time on the runtime's clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.inner.timer.now()
    }

    /// The runtime's timer driver.
    #[must_use]
    pub fn timer(&self) -> &TimerDriverHandle {
        &self.inner.timer
    }

    /// Builds a capability context bound to this runtime.
    #[must_use]
    pub fn cx(&self) -> Cx {
        Cx::new(
            self.clone(),
            self.inner.timer.clone(),
            Arc::clone(&self.inner.entropy),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::sleep;
    use std::time::Duration;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn block_on_ready_future() {
        init_test("block_on_ready_future");
        let runtime = Runtime::new();
        let value = runtime.block_on(async { 42 });
        crate::assert_with_log!(value == 42, "ready value", 42, value);
        crate::test_complete!("block_on_ready_future");
    }

    #[test]
    fn virtual_sleep_advances_clock_exactly() {
        init_test("virtual_sleep_advances_clock_exactly");
        let runtime = Runtime::new();
        let cx = runtime.cx();
        runtime.block_on(async {
            sleep(&cx, Duration::from_millis(250)).await;
        });
        crate::assert_with_log!(
            runtime.now() == Time::from_millis(250),
            "virtual time jumps to the deadline",
            Time::from_millis(250),
            runtime.now()
        );
        crate::test_complete!("virtual_sleep_advances_clock_exactly");
    }

    #[test]
    fn spawned_tasks_complete_in_deadline_order() {
        init_test("spawned_tasks_complete_in_deadline_order");
        let runtime = Runtime::new();
        let handle = runtime.handle();
        let cx = runtime.cx();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (label, ms) in [("slow", 300), ("fast", 100), ("tie", 100)] {
            let cx = cx.clone();
            let log = Arc::clone(&log);
            drop(handle.spawn(async move {
                sleep(&cx, Duration::from_millis(ms)).await;
                log.lock().push(label);
            }));
        }
        runtime.run_until_idle();
        assert_eq!(*log.lock(), vec!["fast", "tie", "slow"]);
        assert_eq!(runtime.pending_tasks(), 0);
        crate::test_complete!("spawned_tasks_complete_in_deadline_order");
    }

    #[test]
    fn join_handle_returns_output() {
        init_test("join_handle_returns_output");
        let runtime = Runtime::new();
        let handle = runtime.handle();
        let cx = runtime.cx();
        let out = runtime.block_on(async move {
            let join = handle.spawn(async move {
                sleep(&cx, Duration::from_millis(10)).await;
                "done"
            });
            join.await
        });
        assert_eq!(out, "done");
    }

    #[test]
    fn stalled_root_is_reported() {
        init_test("stalled_root_is_reported");
        let runtime = Runtime::new();
        let slot = SettleOnce::<()>::new();
        let err = runtime.try_block_on(slot.wait()).unwrap_err();
        crate::assert_with_log!(
            err == RuntimeError::Stalled { pending_tasks: 0 },
            "never-settling root stalls",
            RuntimeError::Stalled { pending_tasks: 0 },
            err
        );
        crate::test_complete!("stalled_root_is_reported");
    }

    #[test]
    fn detached_tasks_survive_between_block_on_calls() {
        init_test("detached_tasks_survive_between_block_on_calls");
        let runtime = Runtime::new();
        let cx = runtime.cx();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let task_cx = cx.clone();
        drop(cx.spawn(async move {
            sleep(&task_cx, Duration::from_secs(1)).await;
            flag.store(true, Ordering::SeqCst);
        }));
        runtime.block_on(async {});
        assert!(!done.load(Ordering::SeqCst));
        runtime.run_until_idle();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(runtime.now(), Time::from_secs(1));
    }

    #[test]
    fn wall_clock_sleep_really_waits() {
        init_test("wall_clock_sleep_really_waits");
        let runtime = Runtime::builder().wall_clock().build();
        let cx = runtime.cx();
        let started = std::time::Instant::now();
        runtime.block_on(async {
            sleep(&cx, Duration::from_millis(20)).await;
        });
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
