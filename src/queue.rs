//! Multi-producer, single-consumer work queue with an out-of-band lane.

use crate::sync::{Mutex, Semaphore};
use core::fmt;
use std::collections::VecDeque;

/// A queued unit of work: no arguments, no return, no error channel.
pub type WorkItem = Box<dyn FnOnce() + Send + 'static>;

/// A thread-safe FIFO with a secondary out-of-band lane.
///
/// Any thread may enqueue; one logical consumer dequeues. Out-of-band items
/// drain before any normal item present at the moment of the dequeue;
/// they exist for cancellations and other must-run-first deliveries. Within a
/// lane, items enqueued by one thread come out in the order that thread
/// pushed them; across threads the order is whatever the lane mutex
/// serialized.
///
/// Concurrent consumers are memory-safe but see an unspecified interleaving;
/// the contract is single-consumer.
#[must_use]
pub struct WorkQueue {
    /// Counts items across both lanes. Released strictly after the lane
    /// push, acquired strictly before the lane pop, so a successful acquire
    /// always finds an item.
    items: Semaphore,
    normal: Mutex<VecDeque<WorkItem>>,
    out_of_band: Mutex<VecDeque<WorkItem>>,
}

impl WorkQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            items: Semaphore::new(0),
            normal: Mutex::new(VecDeque::new()),
            out_of_band: Mutex::new(VecDeque::new()),
        }
    }

    /// Append a work item to the normal lane.
    pub fn enqueue(&self, item: impl FnOnce() + Send + 'static) {
        self.push(&self.normal, Box::new(item));
    }

    /// Append a work item to the out-of-band lane.
    pub fn enqueue_out_of_band(&self, item: impl FnOnce() + Send + 'static) {
        self.push(&self.out_of_band, Box::new(item));
    }

    /// Remove one item, blocking until one is available.
    #[must_use]
    pub fn dequeue(&self) -> WorkItem {
        self.items.acquire();
        self.pop()
    }

    /// Remove one item if any is available.
    #[must_use]
    pub fn try_dequeue(&self) -> Option<WorkItem> {
        if self.items.try_acquire() {
            Some(self.pop())
        } else {
            None
        }
    }

    /// Approximate number of queued items. Informational only.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.value()
    }

    /// Whether the queue currently appears empty. Informational only.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, lane: &Mutex<VecDeque<WorkItem>>, item: WorkItem) {
        lane.lock().expect("work queue lane poisoned").push_back(item);
        self.items.release();
    }

    fn pop(&self) -> WorkItem {
        let popped = self
            .out_of_band
            .lock()
            .expect("work queue lane poisoned")
            .pop_front();
        if let Some(item) = popped {
            return item;
        }
        self.normal
            .lock()
            .expect("work queue lane poisoned")
            .pop_front()
            .expect("work queue semaphore out of sync with lanes")
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
