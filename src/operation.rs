use crate::error::GraphError;
use crate::node::{register_as_dependent, GraphNode, NodeCore, NodeHandle, WeakNodeHandle};
use crate::outcome::{ErrorCode, Failure, Fault, Outcome};
use core::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Result-bearing node core: dependency bookkeeping plus an [`Outcome`] slot.
///
/// Node types embed one of these and drive it through the setter family. Each
/// setter follows the same protocol: write the slot, then transition the node
/// to finished, which fans the notification out to dependents.
///
/// Setter edge cases:
/// - a non-empty slot always raises [`GraphError::InvalidResult`];
/// - a finished node whose slot was destructively consumed accepts the call
///   as a silent no-op; the forwarding paths re-deliver results they may
///   have already drained, and that must stay harmless.
#[derive(Debug)]
pub struct OpCore<T> {
    node: NodeCore,
    slot: Mutex<Outcome<T>>,
}

impl<T> OpCore<T> {
    /// Build a typed core from the node's weak self-handle and dependencies.
    pub fn new(
        self_ref: WeakNodeHandle,
        dependencies: impl IntoIterator<Item = NodeHandle>,
    ) -> Self {
        Self {
            node: NodeCore::new(self_ref, dependencies),
            slot: Mutex::new(Outcome::Empty),
        }
    }

    /// The untyped dependency-tracking core.
    #[must_use]
    pub fn node(&self) -> &NodeCore {
        &self.node
    }

    /// Store a success value and finish the node.
    ///
    /// # Errors
    /// [`GraphError::InvalidResult`] if a result is already present; errors
    /// from dependent hooks propagate out of the finish fan-out.
    pub fn set_value(&self, value: T) -> Result<(), GraphError> {
        self.finish_with(|slot| slot.set_value(value))
    }

    /// Store an error code and finish the node.
    ///
    /// # Errors
    /// As [`set_value`](Self::set_value).
    pub fn set_error(&self, code: ErrorCode) -> Result<(), GraphError> {
        self.finish_with(|slot| slot.set_error(code))
    }

    /// Store a captured fault and finish the node.
    ///
    /// # Errors
    /// As [`set_value`](Self::set_value).
    pub fn set_fault(&self, fault: Fault) -> Result<(), GraphError> {
        self.finish_with(|slot| slot.set_fault(fault))
    }

    /// Install an already-built outcome and finish the node.
    ///
    /// This is the forwarding entry point: delivery closures and combinators
    /// hand over whole outcomes. Installing [`Outcome::Empty`] is allowed and
    /// produces the legal finished-without-result state.
    ///
    /// # Errors
    /// As [`set_value`](Self::set_value).
    pub fn set_raw(&self, outcome: Outcome<T>) -> Result<(), GraphError> {
        self.finish_with(|slot| {
            *slot = outcome;
            Ok(())
        })
    }

    fn finish_with(
        &self,
        write: impl FnOnce(&mut Outcome<T>) -> Result<(), GraphError>,
    ) -> Result<(), GraphError> {
        {
            let mut slot = self.lock_slot();
            if slot.is_valid() {
                return Err(GraphError::InvalidResult("result has already been set"));
            }
            if self.node.finished() {
                // Finished with a drained slot: tolerated re-delivery.
                return Ok(());
            }
            write(&mut slot)?;
        }
        // The slot lock is released before fan-out; notified dependents read
        // this node's result re-entrantly.
        self.node.set_finished()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Outcome<T>> {
        self.slot.lock().expect("result slot poisoned")
    }
}

/// A graph node that carries a typed result slot.
pub trait ResultNode<T>: GraphNode {
    /// The node's typed core.
    fn op_core(&self) -> &OpCore<T>;
}

/// Shared handle to a typed operation.
///
/// This is the reader surface of the graph: query whether the operation has
/// finished and in what state, and fetch the value, error code, or fault.
/// Handles are cheap to clone and do not keep the operation's dependencies
/// alive on their own; the graph's strong edges do that.
#[must_use]
pub struct Operation<T> {
    node: Arc<dyn ResultNode<T>>,
}

impl<T> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<T> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("finished", &self.finished())
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

impl<T> Operation<T> {
    /// Wrap a concrete node in the public handle type.
    pub fn from_node(node: Arc<dyn ResultNode<T>>) -> Self {
        Self { node }
    }

    /// The node as an untyped graph handle, e.g. for dependency lists.
    #[must_use]
    pub fn as_node(&self) -> NodeHandle {
        self.node.op_core().node().handle()
    }

    /// Has the operation finished?
    #[must_use]
    pub fn finished(&self) -> bool {
        self.node.op_core().node().finished()
    }

    /// Does the operation hold any result?
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.node.op_core().lock_slot().is_valid()
    }

    /// Does the operation hold a success value?
    #[must_use]
    pub fn is_value(&self) -> bool {
        self.node.op_core().lock_slot().is_value()
    }

    /// Does the operation hold an error code?
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.node.op_core().lock_slot().is_error()
    }

    /// Does the operation hold a captured fault?
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.node.op_core().lock_slot().is_fault()
    }

    /// Fetch the result.
    ///
    /// Success values are cloned out non-destructively, error codes are
    /// surfaced as [`Failure::Code`] and kept, and a captured fault is
    /// surfaced exactly once; afterwards the slot reads as empty.
    ///
    /// # Errors
    /// [`Failure::Unset`] when no result is present.
    pub fn result(&self) -> Result<T, Failure>
    where
        T: Clone,
    {
        self.node.op_core().lock_slot().result()
    }

    /// Fetch the result destructively, emptying the slot for every state.
    ///
    /// # Errors
    /// As [`result`](Self::result).
    pub fn destroy_result(&self) -> Result<T, Failure> {
        self.node.op_core().lock_slot().destroy_result()
    }

    /// Fetch the error code.
    ///
    /// # Errors
    /// [`GraphError::InvalidResult`] if the result is not an error code.
    pub fn error(&self) -> Result<ErrorCode, GraphError> {
        self.node.op_core().lock_slot().error()
    }

    /// Fetch the captured fault; the handle is shared, not copied.
    ///
    /// # Errors
    /// [`GraphError::InvalidResult`] if the result is not a fault.
    pub fn fault(&self) -> Result<Fault, GraphError> {
        self.node.op_core().lock_slot().fault()
    }

    /// A copy of the raw outcome slot, empty or not.
    #[must_use]
    pub fn raw_result(&self) -> Outcome<T>
    where
        T: Clone,
    {
        self.node.op_core().lock_slot().clone()
    }

    /// Move the raw outcome out, leaving the slot empty.
    ///
    /// Used by delivery paths to avoid copying large payloads twice.
    #[must_use]
    pub fn destroy_raw_result(&self) -> Outcome<T> {
        self.node.op_core().lock_slot().take()
    }
}

struct SourceNode<T> {
    op: OpCore<T>,
}

impl<T: Send + 'static> GraphNode for SourceNode<T> {
    fn core(&self) -> &NodeCore {
        self.op.node()
    }

    fn on_dependency_finished(&self, _dependency: &NodeHandle) -> Result<(), GraphError> {
        unreachable!("a source operation has no dependencies")
    }
}

impl<T: Send + 'static> ResultNode<T> for SourceNode<T> {
    fn op_core(&self) -> &OpCore<T> {
        &self.op
    }
}

/// A dependency-free operation whose result is set from the outside.
///
/// Sources are the leaves of a graph: producers hold a `Source`, everything
/// downstream holds [`Operation`] handles obtained from
/// [`operation`](Self::operation).
#[must_use]
pub struct Source<T> {
    node: Arc<SourceNode<T>>,
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<T: Send + 'static> Default for Source<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Source<T> {
    /// Create an unresolved source.
    pub fn new() -> Self {
        let node = Arc::new_cyclic(|me: &Weak<SourceNode<T>>| SourceNode {
            op: OpCore::new(me.clone(), core::iter::empty()),
        });
        let handle: NodeHandle = node.clone();
        register_as_dependent(&handle);
        Self { node }
    }

    /// A reader handle for the downstream graph.
    pub fn operation(&self) -> Operation<T> {
        let node: Arc<dyn ResultNode<T>> = self.node.clone();
        Operation::from_node(node)
    }

    /// Resolve with a success value.
    ///
    /// # Errors
    /// [`GraphError::InvalidResult`] if already resolved; errors from
    /// dependent hooks propagate.
    pub fn set_value(&self, value: T) -> Result<(), GraphError> {
        self.node.op.set_value(value)
    }

    /// Resolve with an error code.
    ///
    /// # Errors
    /// As [`set_value`](Self::set_value).
    pub fn set_error(&self, code: ErrorCode) -> Result<(), GraphError> {
        self.node.op.set_error(code)
    }

    /// Resolve with a captured fault.
    ///
    /// # Errors
    /// As [`set_value`](Self::set_value).
    pub fn set_fault(&self, fault: Fault) -> Result<(), GraphError> {
        self.node.op.set_fault(fault)
    }
}

impl<T: Send + 'static> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("finished", &self.node.op.node().finished())
            .finish_non_exhaustive()
    }
}
