//! Stored task type for runtime future storage.
//!
//! `StoredTask` wraps a type-erased future that the executor polls. The
//! output is erased; [`spawn`](super::RuntimeHandle::spawn) wraps each future
//! so its result is offered to the task's [`JoinHandle`](super::JoinHandle).

use crate::runtime::RuntimeInner;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Wake};

/// A type-erased future stored in the runtime.
pub(crate) struct StoredTask {
    future: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl StoredTask {
    pub(crate) fn new<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
        }
    }

    /// Polls the stored task once.
    pub(crate) fn poll(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        self.future.as_mut().poll(cx)
    }
}

impl std::fmt::Debug for StoredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredTask").finish_non_exhaustive()
    }
}

/// Waker for a spawned task.
///
/// `scheduled` collapses repeated wakes between two polls into a single
/// ready-queue entry.
#[derive(Debug)]
pub(crate) struct TaskWaker {
    pub(crate) key: usize,
    pub(crate) scheduled: AtomicBool,
    pub(crate) runtime: Weak<RuntimeInner>,
}

impl TaskWaker {
    pub(crate) fn new(key: usize, runtime: Weak<RuntimeInner>) -> Self {
        Self {
            key,
            scheduled: AtomicBool::new(false),
            runtime,
        }
    }

    /// Pushes the task onto the ready queue unless it is already queued.
    pub(crate) fn schedule(&self) {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.enqueue(self.key);
        }
    }
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.schedule();
    }
}

/// A slab entry: the task future (absent while being polled) and its waker.
#[derive(Debug)]
pub(crate) struct TaskSlot {
    pub(crate) task: Option<StoredTask>,
    pub(crate) waker: Arc<TaskWaker>,
}
