//! Timer heap for deadline management.
//!
//! A min-heap of `(deadline, generation)` pairs with the wakers kept in a slab
//! so registrations can be cancelled in O(1). Cancelled entries stay in the
//! heap and are skipped when they surface.

use crate::types::Time;
use slab::Slab;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::task::Waker;

/// Wakers collected from one expiry pass.
pub type WakerBatch = SmallVec<[Waker; 8]>;

/// Identifies a timer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    key: usize,
    generation: u64,
}

impl TimerHandle {
    /// Registration order of this timer; unique per heap.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct TimerEntry {
    deadline: Time,
    generation: u64,
    key: usize,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap: earliest deadline, then earliest registration.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
struct Registration {
    generation: u64,
    waker: Waker,
}

/// A min-heap of timers ordered by deadline, then registration order.
#[derive(Debug, Default)]
pub struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    live: Slab<Registration>,
    next_generation: u64,
}

impl TimerHeap {
    /// Creates a new empty timer heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (not cancelled, not fired) timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns true if no live timers remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Adds a timer that wakes `waker` at `deadline`.
    pub fn insert(&mut self, deadline: Time, waker: Waker) -> TimerHandle {
        let generation = self.next_generation;
        self.next_generation += 1;
        let key = self.live.insert(Registration { generation, waker });
        self.heap.push(TimerEntry {
            deadline,
            generation,
            key,
        });
        TimerHandle { key, generation }
    }

    /// Cancels a registration. Returns true if it was still live.
    pub fn cancel(&mut self, handle: &TimerHandle) -> bool {
        match self.live.get(handle.key) {
            Some(reg) if reg.generation == handle.generation => {
                self.live.remove(handle.key);
                true
            }
            _ => false,
        }
    }

    /// Returns the earliest live deadline, if any.
    pub fn peek_deadline(&mut self) -> Option<Time> {
        self.discard_stale();
        self.heap.peek().map(|e| e.deadline)
    }

    /// Removes every live timer whose deadline is `<= now` and returns their
    /// wakers in firing order.
    pub fn pop_expired(&mut self, now: Time) -> WakerBatch {
        let mut expired = WakerBatch::new();
        loop {
            self.discard_stale();
            match self.heap.peek() {
                Some(entry) if entry.deadline <= now => {
                    let key = entry.key;
                    self.heap.pop();
                    expired.push(self.live.remove(key).waker);
                }
                _ => break,
            }
        }
        expired
    }

    /// Clears all timers without firing them.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }

    fn discard_stale(&mut self) {
        while let Some(entry) = self.heap.peek() {
            let live = self
                .live
                .get(entry.key)
                .is_some_and(|reg| reg.generation == entry.generation);
            if live {
                break;
            }
            self.heap.pop();
        }
    }
}
