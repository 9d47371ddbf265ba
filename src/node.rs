use crate::error::GraphError;
use crate::types::{IndexMap, NodeId};
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Shared handle to any graph node.
pub type NodeHandle = Arc<dyn GraphNode>;
/// Weak back-reference to a graph node.
pub type WeakNodeHandle = Weak<dyn GraphNode>;

/// A node in the dependency graph.
///
/// Node types embed a [`NodeCore`] (usually through
/// [`OpCore`](crate::operation::OpCore)) and implement
/// [`on_dependency_finished`](Self::on_dependency_finished), the reaction to
/// one of their dependencies moving to the finished state. The core handles
/// the rest: edge bookkeeping, finish propagation, and teardown.
///
/// Dependency cycles are prevented structurally: a node's dependencies are
/// fixed at construction and can only be removed afterwards, so a cycle would
/// require a node to reference another that does not exist yet.
pub trait GraphNode: Send + Sync {
    /// The node's dependency-tracking core.
    fn core(&self) -> &NodeCore;

    /// React to a dependency having just finished.
    ///
    /// Called at most once per dependency, on the thread that finished the
    /// dependency. Implementations typically inspect their inputs and decide
    /// whether to finish themselves.
    ///
    /// # Errors
    /// Errors propagate to whoever triggered the finish, the same way they
    /// would out of any other graph mutation.
    fn on_dependency_finished(&self, dependency: &NodeHandle) -> Result<(), GraphError>;

    /// Validate and dispatch a dependency-finished notification.
    ///
    /// # Errors
    /// [`GraphError::BadDependency`] if `dependency` is not a current
    /// dependency of this node.
    fn dependency_finished(&self, dependency: &NodeHandle) -> Result<(), GraphError> {
        if !self.core().has_dependency(dependency) {
            return Err(GraphError::BadDependency(
                "notified by a node that is not a dependency",
            ));
        }
        self.on_dependency_finished(dependency)
    }
}

/// Register a node as a dependent of each of its dependencies.
///
/// Factory functions must call this once a shared handle exists: the weak
/// back-references can only be minted from a live handle, which is why
/// construction itself cannot do it. The call is harmless and idempotent.
/// Dependencies that have already finished are skipped (a finished node never
/// notifies again); factories replay those notifications themselves.
pub fn register_as_dependent(node: &NodeHandle) {
    for dependency in node.core().dependency_handles() {
        dependency.core().add_dependent(node);
    }
}

struct Edges {
    /// Strong down-edges, fixed at construction, only removable.
    dependencies: IndexMap<NodeId, NodeHandle>,
    /// Weak up-edges, keyed by node identity.
    dependents: IndexMap<NodeId, WeakNodeHandle>,
}

/// Dependency bookkeeping shared by every node type.
///
/// Holds the strong references to dependencies (so inputs outlive their
/// readers), the weak references to dependents (so unused downstream nodes
/// can be collected), and the monotonic finished flag.
pub struct NodeCore {
    id: NodeId,
    self_ref: WeakNodeHandle,
    finished: AtomicBool,
    /// When set, teardown must not touch the dependencies' dependent maps:
    /// they are owned by another thread.
    multithreaded_dependencies: AtomicBool,
    edges: Mutex<Edges>,
}

impl NodeCore {
    /// Build a core from the node's own weak handle and its dependencies.
    ///
    /// Duplicate dependencies collapse into one edge. Factories are expected
    /// to use [`Arc::new_cyclic`] to obtain `self_ref` and to call
    /// [`register_as_dependent`] once construction returns.
    pub fn new(
        self_ref: WeakNodeHandle,
        dependencies: impl IntoIterator<Item = NodeHandle>,
    ) -> Self {
        let dependencies = dependencies
            .into_iter()
            .map(|dep| (NodeId::of(&dep), dep))
            .collect();
        Self {
            id: NodeId::of_weak(&self_ref),
            self_ref,
            finished: AtomicBool::new(false),
            multithreaded_dependencies: AtomicBool::new(false),
            edges: Mutex::new(Edges {
                dependencies,
                dependents: IndexMap::default(),
            }),
        }
    }

    /// This node's identity.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// A fresh shared handle to this node.
    ///
    /// # Panics
    /// If called while the node is being torn down.
    #[must_use]
    pub fn handle(&self) -> NodeHandle {
        self.self_ref.upgrade().expect("node used during teardown")
    }

    /// Has this node finished?
    #[must_use]
    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// How many dependencies remain?
    #[must_use]
    pub fn num_dependencies(&self) -> usize {
        self.lock_edges().dependencies.len()
    }

    /// Have all remaining dependencies finished?
    ///
    /// Vacuously true once the dependency set is empty.
    #[must_use]
    pub fn all_dependencies_finished(&self) -> bool {
        self.lock_edges()
            .dependencies
            .values()
            .all(|dep| dep.core().finished())
    }

    /// Is `node` a current dependency of this node?
    #[must_use]
    pub fn has_dependency(&self, node: &NodeHandle) -> bool {
        self.lock_edges().dependencies.contains_key(&NodeId::of(node))
    }

    /// Declare whether any dependency may live in another thread.
    ///
    /// Returns the previous value. See the field invariant: with this set,
    /// dropping the node leaves its dependencies' dependent maps alone and
    /// lets them discover the dead weak reference lazily.
    pub fn set_multithreaded_dependencies(&self, newval: bool) -> bool {
        self.multithreaded_dependencies.swap(newval, Ordering::AcqRel)
    }

    /// Stop depending on `dependency`, removing both edge directions.
    ///
    /// Removing the last dependency does not finish the node; that is the
    /// node type's own policy decision.
    ///
    /// # Errors
    /// [`GraphError::BadDependency`] if the edge does not exist.
    pub fn remove_dependency(&self, dependency: &NodeHandle) -> Result<(), GraphError> {
        let removed = self
            .lock_edges()
            .dependencies
            .shift_remove(&NodeId::of(dependency));
        match removed {
            Some(dep) => {
                dep.core().remove_dependent(self.id);
                Ok(())
            }
            None => Err(GraphError::BadDependency(
                "tried to remove a dependency this node does not have",
            )),
        }
    }

    /// Mark this node finished and fan the news out.
    ///
    /// The node first detaches itself from its dependencies (dropping the
    /// strong down-edges), then notifies every live dependent exactly once.
    /// The dependents map is drained by pop-and-release rather than iterated
    /// in place: a notified dependent may re-entrantly deregister other
    /// dependents, and the map must stay consistent through that.
    ///
    /// Callers must not finish a node twice.
    ///
    /// # Errors
    /// The first error returned by a dependent's hook; remaining dependents
    /// are left unnotified, as an unwinding notification loop would.
    ///
    /// # Panics
    /// If called while the node is being torn down.
    pub fn set_finished(&self) -> Result<(), GraphError> {
        // Pinned so the node survives its own fan-out even if every external
        // holder drops mid-notification.
        let me = self.handle();
        self.finished.store(true, Ordering::Release);

        let dependencies = core::mem::take(&mut self.lock_edges().dependencies);
        for dep in dependencies.into_values() {
            dep.core().remove_dependent(self.id);
        }

        loop {
            let popped = self.lock_edges().dependents.shift_remove_index(0);
            let Some((_, weak)) = popped else { break };
            if let Some(dependent) = weak.upgrade() {
                dependent.dependency_finished(&me)?;
            }
        }
        Ok(())
    }

    pub(crate) fn add_dependent(&self, dependent: &NodeHandle) {
        // A finished node never notifies again; registering would only leave
        // a stale entry behind.
        if self.finished() {
            return;
        }
        self.lock_edges()
            .dependents
            .insert(NodeId::of(dependent), Arc::downgrade(dependent));
    }

    pub(crate) fn remove_dependent(&self, dependent: NodeId) {
        self.lock_edges().dependents.shift_remove(&dependent);
    }

    pub(crate) fn dependency_handles(&self) -> Vec<NodeHandle> {
        self.lock_edges().dependencies.values().cloned().collect()
    }

    fn lock_edges(&self) -> std::sync::MutexGuard<'_, Edges> {
        self.edges.lock().expect("node edge state poisoned")
    }
}

impl Drop for NodeCore {
    fn drop(&mut self) {
        // Courtesy detach: tell the dependencies to forget this node. Skipped
        // when they may live in another thread; their dependent maps are not
        // ours to touch, and the dead weak reference is discovered lazily.
        if self.multithreaded_dependencies.load(Ordering::Acquire) {
            return;
        }
        let edges = self.edges.get_mut().unwrap_or_else(PoisonError::into_inner);
        let dependencies = core::mem::take(&mut edges.dependencies);
        for dep in dependencies.into_values() {
            dep.core().remove_dependent(self.id);
        }
    }
}

impl fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCore")
            .field("id", &self.id)
            .field("finished", &self.finished())
            .finish_non_exhaustive()
    }
}
