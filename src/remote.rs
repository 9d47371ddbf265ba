//! Cross-thread result delivery: the remote/promise pair.
//!
//! [`create`] mints a consumer-side operation and a producer-side
//! [`Promise`]. The producer fulfils the promise from its own thread; the
//! fulfilment enqueues a delivery closure on the consumer's [`WorkQueue`],
//! and whichever call drains that queue installs the result into the remote
//! operation, finishing it exactly as a local operation would and waking its
//! local dependents.
//!
//! [`promised`] is the inverse direction: a producer-side node that forwards
//! a local operation's result into a promise the moment it finishes.

use crate::error::GraphError;
use crate::node::{register_as_dependent, GraphNode, NodeCore, NodeHandle};
use crate::operation::{OpCore, Operation, ResultNode};
use crate::outcome::{ErrorCode, Fault, Outcome};
use crate::queue::WorkQueue;
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;

/// The fault delivered to a remote operation whose promise was dropped while
/// still needed and unfulfilled.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("promise dropped before delivering a result")]
pub struct BrokenPromise;

struct RemoteNode<T> {
    op: OpCore<T>,
}

impl<T: Send + 'static> GraphNode for RemoteNode<T> {
    fn core(&self) -> &NodeCore {
        self.op.node()
    }

    fn on_dependency_finished(&self, _dependency: &NodeHandle) -> Result<(), GraphError> {
        unreachable!("a remote operation has no dependencies")
    }
}

impl<T: Send + 'static> ResultNode<T> for RemoteNode<T> {
    fn op_core(&self) -> &OpCore<T> {
        &self.op
    }
}

/// Create a remote operation and its producer-side promise.
///
/// The operation belongs to the consumer thread that owns `queue`; the
/// promise may move to any producer thread. Dropping the operation cancels
/// the hand-off: the producer's next [`still_needed`](Promise::still_needed)
/// turns false and fulfilment becomes a no-op.
pub fn create<T: Send + 'static>(queue: Arc<WorkQueue>) -> (Operation<T>, Promise<T>) {
    let node = Arc::new_cyclic(|me: &Weak<RemoteNode<T>>| RemoteNode {
        op: OpCore::new(me.clone(), core::iter::empty()),
    });
    // The node's drop must not reach across the thread boundary; with no
    // dependencies there is nothing to detach anyway.
    node.op.node().set_multithreaded_dependencies(true);
    let handle: NodeHandle = node.clone();
    register_as_dependent(&handle);
    let promise = Promise {
        target: Arc::downgrade(&node),
        queue,
        fulfilled: false,
    };
    let node: Arc<dyn ResultNode<T>> = node;
    (Operation::from_node(node), promise)
}

/// Producer-side handle that delivers one result to a remote operation.
///
/// At most one fulfilment ever enqueues a delivery. Dropping a promise that
/// is still needed and unfulfilled delivers a [`BrokenPromise`] fault
/// instead, so the consumer side always learns its fate.
#[must_use = "dropping an unfulfilled promise delivers a broken-promise fault"]
#[derive(Debug)]
pub struct Promise<T: Send + 'static> {
    target: Weak<RemoteNode<T>>,
    queue: Arc<WorkQueue>,
    fulfilled: bool,
}

impl<T: Send + 'static> Promise<T> {
    /// Is anyone still waiting for this promise?
    ///
    /// True iff the remote operation is alive and the promise has not been
    /// fulfilled.
    #[must_use]
    pub fn still_needed(&self) -> bool {
        !self.fulfilled && self.target.strong_count() > 0
    }

    /// Has a fulfilment already been accepted?
    #[must_use]
    pub fn fulfilled(&self) -> bool {
        self.fulfilled
    }

    /// Fulfil with a success value.
    ///
    /// # Errors
    /// [`GraphError::InvalidResult`] if the promise was already fulfilled.
    pub fn set_result(&mut self, value: T) -> Result<(), GraphError> {
        self.deliver(Outcome::Value(value))
    }

    /// Fulfil with an error code.
    ///
    /// # Errors
    /// As [`set_result`](Self::set_result).
    pub fn set_error(&mut self, code: ErrorCode) -> Result<(), GraphError> {
        self.deliver(Outcome::Error(code))
    }

    /// Fulfil with a captured fault.
    ///
    /// # Errors
    /// As [`set_result`](Self::set_result).
    pub fn set_fault(&mut self, fault: Fault) -> Result<(), GraphError> {
        self.deliver(Outcome::Fault(fault))
    }

    pub(crate) fn deliver(&mut self, outcome: Outcome<T>) -> Result<(), GraphError> {
        if self.fulfilled {
            return Err(GraphError::InvalidResult("promise already fulfilled"));
        }
        self.fulfilled = true;
        // A dead target means the consumer cancelled; discard silently but
        // still count as fulfilled.
        if self.target.strong_count() == 0 {
            return Ok(());
        }
        Self::enqueue_delivery(&self.queue, self.target.clone(), outcome);
        Ok(())
    }

    fn enqueue_delivery(queue: &WorkQueue, target: Weak<RemoteNode<T>>, outcome: Outcome<T>) {
        queue.enqueue(move || {
            if let Some(node) = target.upgrade() {
                // The work-item contract has no error channel; a conflicting
                // delivery cannot happen (the promise enforces single
                // fulfilment) and downstream hook errors die here like they
                // would at the top of any event loop.
                let _ = node.op.set_raw(outcome);
            }
        });
    }
}

impl<T: Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        if self.fulfilled || self.target.strong_count() == 0 {
            return;
        }
        let target = self.target.clone();
        self.queue.enqueue(move || {
            if let Some(node) = target.upgrade() {
                let _ = node.op.set_raw(Outcome::Fault(Fault::new(BrokenPromise)));
            }
        });
    }
}

struct PromisedNode<T: Send + 'static> {
    op: OpCore<T>,
    /// Consumed when the local operation finishes.
    forward: Mutex<Option<ForwardState<T>>>,
}

struct ForwardState<T: Send + 'static> {
    promise: Promise<T>,
    local: Operation<T>,
}

impl<T: Clone + Send + 'static> GraphNode for PromisedNode<T> {
    fn core(&self) -> &NodeCore {
        self.op.node()
    }

    fn on_dependency_finished(&self, _dependency: &NodeHandle) -> Result<(), GraphError> {
        if self.op.node().finished() {
            return Ok(());
        }
        let taken = self
            .forward
            .lock()
            .expect("promised forward state poisoned")
            .take();
        let Some(ForwardState { mut promise, local }) = taken else {
            return Ok(());
        };
        let outcome = local.raw_result();
        promise.deliver(outcome.clone())?;
        self.op.set_raw(outcome)
    }
}

impl<T: Clone + Send + 'static> ResultNode<T> for PromisedNode<T> {
    fn op_core(&self) -> &OpCore<T> {
        &self.op
    }
}

/// Forward a local operation's result into a promise.
///
/// The returned operation depends on `local`; when `local` finishes, its raw
/// outcome is copied into the promise first and then into the returned
/// operation itself. Dropping the returned operation before `local` finishes
/// drops the promise, which delivers the broken-promise fault.
///
/// # Errors
/// [`GraphError::InvalidResult`] if `promise` is already fulfilled; errors
/// surfacing from construction-time replay when `local` has already
/// finished.
pub fn promised<T: Clone + Send + 'static>(
    promise: Promise<T>,
    local: &Operation<T>,
) -> Result<Operation<T>, GraphError> {
    if promise.fulfilled() {
        return Err(GraphError::InvalidResult(
            "cannot forward into an already fulfilled promise",
        ));
    }
    let local_handle = local.as_node();
    let node = Arc::new_cyclic(|me: &Weak<PromisedNode<T>>| PromisedNode {
        op: OpCore::new(me.clone(), [local_handle.clone()]),
        forward: Mutex::new(Some(ForwardState {
            promise,
            local: local.clone(),
        })),
    });
    let handle: NodeHandle = node.clone();
    register_as_dependent(&handle);
    if local_handle.core().finished() {
        node.dependency_finished(&local_handle)?;
    }
    let node: Arc<dyn ResultNode<T>> = node;
    Ok(Operation::from_node(node))
}
