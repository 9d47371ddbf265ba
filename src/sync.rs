//! Synchronization primitives, switchable to loom for model checking.
//!
//! The work queue and its semaphore go through this module so that
//! `tests/loom.rs` (feature `loom`) can explore their interleavings. The
//! graph side uses `std::sync` directly: it leans on `Weak`, which loom's
//! `Arc` does not model.

#[cfg(feature = "loom")]
mod imp {
    pub(crate) use loom::sync::{Condvar, Mutex};
}

#[cfg(not(feature = "loom"))]
mod imp {
    pub(crate) use std::sync::{Condvar, Mutex};
}

pub(crate) use imp::*;

/// A counting semaphore: a blocking counter with no ownership semantics.
///
/// `release` may run on any thread; `acquire` parks until the count is
/// positive. The queue relies on the release/acquire pairing as its
/// cross-thread happens-before edge.
pub(crate) struct Semaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub(crate) fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    /// Decrement the count, blocking while it is zero.
    pub(crate) fn acquire(&self) {
        let mut count = self.count.lock().expect("semaphore poisoned");
        while *count == 0 {
            count = self.available.wait(count).expect("semaphore poisoned");
        }
        *count -= 1;
    }

    /// Decrement the count if it is positive.
    pub(crate) fn try_acquire(&self) -> bool {
        let mut count = self.count.lock().expect("semaphore poisoned");
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// Increment the count and wake one waiter.
    pub(crate) fn release(&self) {
        let mut count = self.count.lock().expect("semaphore poisoned");
        *count += 1;
        self.available.notify_one();
    }

    /// The current count. Informational only: it may be stale by the time
    /// the caller looks at it.
    pub(crate) fn value(&self) -> usize {
        *self.count.lock().expect("semaphore poisoned")
    }
}
