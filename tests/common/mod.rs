//! Shared test node types: finish-order logging and drop tracking.
#![allow(dead_code)]

use opgraph::deferred::DeferArg;
use opgraph::error::GraphError;
use opgraph::node::{register_as_dependent, GraphNode, NodeCore, NodeHandle};
use opgraph::operation::{OpCore, Operation, ResultNode};
use opgraph::outcome::{ErrorCode, Failure, Fault};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Records the order in which named nodes finished.
#[derive(Clone, Default)]
pub struct FinishLog(Arc<Mutex<Vec<&'static str>>>);

impl FinishLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, name: &'static str) {
        self.0.lock().unwrap().push(name);
    }

    pub fn pop(&self) {
        self.0.lock().unwrap().pop();
    }

    pub fn entries(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

pub type DropFlag = Arc<AtomicBool>;

pub fn drop_flag() -> DropFlag {
    Arc::new(AtomicBool::new(false))
}

pub fn was_dropped(flag: &DropFlag) -> bool {
    flag.load(Ordering::SeqCst)
}

/// An untyped node that finishes once all its dependencies have finished,
/// logging its name when it does.
pub struct Thunk {
    core: NodeCore,
    name: &'static str,
    log: FinishLog,
    dropped: Option<DropFlag>,
}

impl Thunk {
    pub fn create(
        name: &'static str,
        log: &FinishLog,
        dropped: Option<DropFlag>,
        deps: &[NodeHandle],
    ) -> Arc<Self> {
        let node = Arc::new_cyclic(|me: &Weak<Self>| Self {
            core: NodeCore::new(me.clone(), deps.iter().cloned()),
            name,
            log: log.clone(),
            dropped,
        });
        let handle: NodeHandle = node.clone();
        register_as_dependent(&handle);
        node
    }

    pub fn handle(&self) -> NodeHandle {
        self.core.handle()
    }

    pub fn finish(&self) -> Result<(), GraphError> {
        self.log.push(self.name);
        self.core.set_finished()
    }
}

impl GraphNode for Thunk {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn on_dependency_finished(&self, dependency: &NodeHandle) -> Result<(), GraphError> {
        assert!(
            dependency.core().finished(),
            "{:?} notified by an unfinished dependency",
            self.name
        );
        if self.core.all_dependencies_finished() {
            self.finish()
        } else {
            Ok(())
        }
    }
}

impl Drop for Thunk {
    fn drop(&mut self) {
        if let Some(flag) = &self.dropped {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

struct TrackedSourceNode<T: Send + 'static> {
    op: OpCore<T>,
    name: &'static str,
    log: FinishLog,
    dropped: Option<DropFlag>,
}

impl<T: Send + 'static> GraphNode for TrackedSourceNode<T> {
    fn core(&self) -> &NodeCore {
        self.op.node()
    }

    fn on_dependency_finished(&self, _dependency: &NodeHandle) -> Result<(), GraphError> {
        unreachable!("tracked sources have no dependencies")
    }
}

impl<T: Send + 'static> ResultNode<T> for TrackedSourceNode<T> {
    fn op_core(&self) -> &OpCore<T> {
        &self.op
    }
}

impl<T: Send + 'static> Drop for TrackedSourceNode<T> {
    fn drop(&mut self) {
        if let Some(flag) = &self.dropped {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

/// A settable leaf operation that logs its name on finishing and flags its
/// drop.
pub struct TrackedSource<T: Send + 'static> {
    node: Arc<TrackedSourceNode<T>>,
}

impl<T: Send + 'static> TrackedSource<T> {
    pub fn create(name: &'static str, log: &FinishLog, dropped: Option<DropFlag>) -> Self {
        let node = Arc::new_cyclic(|me: &Weak<TrackedSourceNode<T>>| TrackedSourceNode {
            op: OpCore::new(me.clone(), core::iter::empty()),
            name,
            log: log.clone(),
            dropped,
        });
        let handle: NodeHandle = node.clone();
        register_as_dependent(&handle);
        Self { node }
    }

    pub fn operation(&self) -> Operation<T> {
        let node: Arc<dyn ResultNode<T>> = self.node.clone();
        Operation::from_node(node)
    }

    pub fn set_value(&self, value: T) -> Result<(), GraphError> {
        self.logged(|op| op.set_value(value))
    }

    pub fn set_error(&self, code: ErrorCode) -> Result<(), GraphError> {
        self.logged(|op| op.set_error(code))
    }

    pub fn set_fault(&self, fault: Fault) -> Result<(), GraphError> {
        self.logged(|op| op.set_fault(fault))
    }

    fn logged(
        &self,
        set: impl FnOnce(&OpCore<T>) -> Result<(), GraphError>,
    ) -> Result<(), GraphError> {
        // Log first so this node's name precedes everything it triggers;
        // roll back if the set is rejected.
        self.node.log.push(self.node.name);
        let result = set(&self.node.op);
        if result.is_err() {
            self.node.log.pop();
        }
        result
    }
}

type Combine = fn(i32, i32) -> Result<i32, Fault>;

struct AdderNode {
    op: OpCore<i32>,
    name: &'static str,
    log: FinishLog,
    dropped: Option<DropFlag>,
    combine: Combine,
    args: Mutex<Option<(Operation<i32>, Operation<i32>)>>,
}

enum Decision {
    Wait,
    Fail(Failure),
    Compute(i32, i32),
}

impl GraphNode for AdderNode {
    fn core(&self) -> &NodeCore {
        self.op.node()
    }

    fn on_dependency_finished(&self, _dependency: &NodeHandle) -> Result<(), GraphError> {
        if self.op.node().finished() {
            return Ok(());
        }
        let decision = {
            let guard = self.args.lock().unwrap();
            let Some((a, b)) = guard.as_ref() else {
                return Ok(());
            };
            if let Some(failure) = a.failure().or_else(|| b.failure()) {
                Decision::Fail(failure)
            } else if a.finished() && b.finished() {
                match (a.result(), b.result()) {
                    (Ok(x), Ok(y)) => Decision::Compute(x, y),
                    (Err(failure), _) | (_, Err(failure)) => Decision::Fail(failure),
                }
            } else {
                Decision::Wait
            }
        };
        match decision {
            Decision::Wait => return Ok(()),
            Decision::Fail(failure) => self.logged(|op| match failure {
                Failure::Code(code) => op.set_error(code),
                Failure::Fault(fault) => op.set_fault(fault),
                _ => op.set_fault(Fault::msg("argument finished without a result")),
            })?,
            Decision::Compute(x, y) => match (self.combine)(x, y) {
                Ok(value) => self.logged(|op| op.set_value(value))?,
                Err(fault) => self.logged(|op| op.set_fault(fault))?,
            },
        }
        if self.op.node().finished() {
            // The inputs are no longer needed once the sum is settled.
            self.args.lock().unwrap().take();
        }
        Ok(())
    }
}

impl ResultNode<i32> for AdderNode {
    fn op_core(&self) -> &OpCore<i32> {
        &self.op
    }
}

impl AdderNode {
    fn logged(
        &self,
        set: impl FnOnce(&OpCore<i32>) -> Result<(), GraphError>,
    ) -> Result<(), GraphError> {
        self.log.push(self.name);
        let result = set(&self.op);
        if result.is_err() {
            self.log.pop();
        }
        result
    }
}

impl Drop for AdderNode {
    fn drop(&mut self) {
        if let Some(flag) = &self.dropped {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

/// Build a two-argument combining operation over `i32` inputs.
///
/// Forwards the first failed argument, otherwise applies `combine` once both
/// arguments are ready, capturing its failure as a fault.
pub fn adder(
    name: &'static str,
    log: &FinishLog,
    dropped: Option<DropFlag>,
    a: &Operation<i32>,
    b: &Operation<i32>,
    combine: Combine,
) -> Result<Operation<i32>, GraphError> {
    let deps = [a.as_node(), b.as_node()];
    let node = Arc::new_cyclic(|me: &Weak<AdderNode>| AdderNode {
        op: OpCore::new(me.clone(), deps.iter().cloned()),
        name,
        log: log.clone(),
        dropped,
        combine,
        args: Mutex::new(Some((a.clone(), b.clone()))),
    });
    let handle: NodeHandle = node.clone();
    register_as_dependent(&handle);
    for dep in &deps {
        if node.op.node().finished() {
            break;
        }
        if dep.core().finished() {
            node.dependency_finished(dep)?;
        }
    }
    let node: Arc<dyn ResultNode<i32>> = node;
    Ok(Operation::from_node(node))
}

pub fn sum(a: i32, b: i32) -> Result<i32, Fault> {
    Ok(a + b)
}

pub fn test_code(code: i32) -> ErrorCode {
    ErrorCode::new("test", core::num::NonZeroI32::new(code).unwrap())
}
