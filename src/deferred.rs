//! Defer a call until its operation-valued arguments are ready.
//!
//! [`defer`] wraps a callable; [`until`](Deferred::until) takes its arguments
//! as a tuple and produces an [`Operation`] that fires the callable once
//! every argument operation has finished. An argument that finishes with an
//! error or fault short-circuits the call: the first failing argument, in
//! positional order, supplies the produced operation's bad result and the
//! callable never runs. A panic escaping the callable is captured as a
//! [`CapturedPanic`](crate::outcome::CapturedPanic) fault instead of
//! unwinding through the graph.
//!
//! ```ignore
//! let product = defer(|a: i32, b: i32| a * b).until((a.operation(), b.operation()))?;
//! ```
//!
//! Plain values ride along with [`just`]: each argument position is either an
//! [`Operation<A>`] (a dependency, unwrapped to `A` at call time) or a
//! [`Just<V>`] (captured and passed through by value).

use crate::error::GraphError;
use crate::node::{register_as_dependent, GraphNode, NodeCore, NodeHandle};
use crate::operation::{OpCore, Operation, ResultNode};
use crate::outcome::{Failure, Fault, Outcome};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// One argument position of a deferred call.
pub trait DeferArg {
    /// What the callable receives for this position.
    type Value;

    /// The dependency edge this argument contributes, if any.
    fn dependency(&self) -> Option<NodeHandle>;

    /// Would unwrapping this argument fail right now?
    ///
    /// Only settled failures count; an argument that merely has not finished
    /// yet reports `None`.
    fn failure(&self) -> Option<Failure>;

    /// Produce the value for the call.
    ///
    /// # Errors
    /// The argument operation's failure, if it did not finish with a value.
    fn unwrap_value(self) -> Result<Self::Value, Failure>;
}

impl<T: Clone + Send + 'static> DeferArg for Operation<T> {
    type Value = T;

    fn dependency(&self) -> Option<NodeHandle> {
        Some(self.as_node())
    }

    fn failure(&self) -> Option<Failure> {
        if self.is_error() {
            self.error().ok().map(Failure::Code)
        } else if self.is_fault() {
            self.fault().ok().map(Failure::Fault)
        } else {
            None
        }
    }

    fn unwrap_value(self) -> Result<T, Failure> {
        self.result()
    }
}

/// A plain value captured into a deferred call.
///
/// The explicit wrapper is what makes the per-position dispatch static: an
/// argument is either an operation (and a dependency) or a `Just` (and not).
#[derive(Debug, Clone, Copy)]
pub struct Just<V>(pub V);

/// Capture a plain value as a deferred-call argument.
pub fn just<V>(value: V) -> Just<V> {
    Just(value)
}

impl<V> DeferArg for Just<V> {
    type Value = V;

    fn dependency(&self) -> Option<NodeHandle> {
        None
    }

    fn failure(&self) -> Option<Failure> {
        None
    }

    fn unwrap_value(self) -> Result<V, Failure> {
        Ok(self.0)
    }
}

/// A tuple of [`DeferArg`]s (arity 1 through 8).
pub trait ArgList {
    /// The tuple of unwrapped values handed to the callable.
    type Values;

    /// The dependency edges contributed by the arguments, in positional
    /// order.
    fn dependencies(&self) -> Vec<NodeHandle>;

    /// The first settled failure among the arguments, in positional order.
    fn first_failure(&self) -> Option<Failure>;

    /// Unwrap every argument.
    ///
    /// # Errors
    /// The first failure encountered, in positional order.
    fn unwrap_values(self) -> Result<Self::Values, Failure>;
}

/// A callable invokable with an argument tuple.
///
/// Implemented for every `FnOnce` of matching arity; this is what lets
/// [`until`](Deferred::until) be generic over the argument count.
pub trait Callable<Args> {
    /// The callable's return type.
    type Output;

    /// Invoke with the unwrapped argument values.
    fn call(self, args: Args) -> Self::Output;
}

macro_rules! impl_arg_tuple {
    ($($ty:ident $val:ident),+) => {
        impl<$($ty: DeferArg),+> ArgList for ($($ty,)+) {
            type Values = ($($ty::Value,)+);

            fn dependencies(&self) -> Vec<NodeHandle> {
                let ($($val,)+) = self;
                let mut deps = Vec::new();
                $(
                    if let Some(dep) = $val.dependency() {
                        deps.push(dep);
                    }
                )+
                deps
            }

            fn first_failure(&self) -> Option<Failure> {
                let ($($val,)+) = self;
                $(
                    if let Some(failure) = $val.failure() {
                        return Some(failure);
                    }
                )+
                None
            }

            fn unwrap_values(self) -> Result<Self::Values, Failure> {
                let ($($val,)+) = self;
                Ok(($($val.unwrap_value()?,)+))
            }
        }

        impl<Func, Ret, $($ty),+> Callable<($($ty,)+)> for Func
        where
            Func: FnOnce($($ty),+) -> Ret,
        {
            type Output = Ret;

            fn call(self, ($($val,)+): ($($ty,)+)) -> Ret {
                self($($val),+)
            }
        }
    };
}

impl_arg_tuple!(A1 a1);
impl_arg_tuple!(A1 a1, A2 a2);
impl_arg_tuple!(A1 a1, A2 a2, A3 a3);
impl_arg_tuple!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_arg_tuple!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_arg_tuple!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
impl_arg_tuple!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7);
impl_arg_tuple!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8);

/// Wrap a callable for deferred invocation.
pub fn defer<F>(func: F) -> Deferred<F> {
    Deferred { func }
}

/// A callable waiting for its arguments; see [`defer`].
#[must_use]
#[derive(Debug, Clone, Copy)]
pub struct Deferred<F> {
    func: F,
}

impl<F> Deferred<F> {
    /// Build the operation that fires the callable once `args` are ready.
    ///
    /// Arguments whose operations have already finished are replayed at
    /// construction, in positional order; an argument list with no
    /// operations at all is evaluated immediately.
    ///
    /// # Errors
    /// Errors surfacing from dependent hooks during construction-time
    /// replay.
    pub fn until<A>(self, args: A) -> Result<Operation<F::Output>, GraphError>
    where
        A: ArgList + Send + 'static,
        F: Callable<A::Values> + Send + 'static,
        F::Output: Send + 'static,
    {
        let dependencies = args.dependencies();
        let node = Arc::new_cyclic(|me: &Weak<DeferredNode<F, A>>| DeferredNode {
            op: OpCore::new(me.clone(), dependencies.iter().cloned()),
            call: Mutex::new(Some(SuspendedCall {
                func: self.func,
                args,
            })),
        });
        let handle: NodeHandle = node.clone();
        register_as_dependent(&handle);
        if dependencies.is_empty() {
            node.try_complete()?;
        } else {
            for dep in &dependencies {
                if node.op.node().finished() {
                    break;
                }
                if dep.core().finished() {
                    node.dependency_finished(dep)?;
                }
            }
        }
        let node: Arc<dyn ResultNode<F::Output>> = node;
        Ok(Operation::from_node(node))
    }
}

struct SuspendedCall<F, A> {
    func: F,
    args: A,
}

struct DeferredNode<F, A>
where
    A: ArgList,
    F: Callable<A::Values>,
{
    op: OpCore<F::Output>,
    /// Consumed exactly once, by whichever notification completes the node;
    /// taking it also releases the argument handles.
    call: Mutex<Option<SuspendedCall<F, A>>>,
}

impl<F, A> DeferredNode<F, A>
where
    A: ArgList + Send + 'static,
    F: Callable<A::Values> + Send + 'static,
    F::Output: Send + 'static,
{
    fn try_complete(&self) -> Result<(), GraphError> {
        if self.op.node().finished() {
            return Ok(());
        }
        let settled_failure = {
            let call = self.lock_call();
            call.as_ref().and_then(|call| call.args.first_failure())
        };
        if let Some(failure) = settled_failure {
            drop(self.lock_call().take());
            return self.op.set_raw(failure_outcome(failure));
        }
        if !self.op.node().all_dependencies_finished() {
            return Ok(());
        }
        let Some(SuspendedCall { func, args }) = self.lock_call().take() else {
            return Ok(());
        };
        let outcome = match args.unwrap_values() {
            Err(failure) => failure_outcome(failure),
            Ok(values) => match catch_unwind(AssertUnwindSafe(move || func.call(values))) {
                Ok(value) => Outcome::Value(value),
                Err(payload) => Outcome::Fault(Fault::from_panic(payload)),
            },
        };
        self.op.set_raw(outcome)
    }

    fn lock_call(&self) -> MutexGuard<'_, Option<SuspendedCall<F, A>>> {
        self.call.lock().expect("deferred call state poisoned")
    }
}

impl<F, A> GraphNode for DeferredNode<F, A>
where
    A: ArgList + Send + 'static,
    F: Callable<A::Values> + Send + 'static,
    F::Output: Send + 'static,
{
    fn core(&self) -> &NodeCore {
        self.op.node()
    }

    fn on_dependency_finished(&self, _dependency: &NodeHandle) -> Result<(), GraphError> {
        self.try_complete()
    }
}

impl<F, A> ResultNode<F::Output> for DeferredNode<F, A>
where
    A: ArgList + Send + 'static,
    F: Callable<A::Values> + Send + 'static,
    F::Output: Send + 'static,
{
    fn op_core(&self) -> &OpCore<F::Output> {
        &self.op
    }
}

fn failure_outcome<T>(failure: Failure) -> Outcome<T> {
    match failure {
        Failure::Code(code) => Outcome::Error(code),
        Failure::Fault(fault) => Outcome::Fault(fault),
        Failure::Unset => Outcome::Fault(Fault::new(GraphError::InvalidResult(
            "argument operation finished without a result",
        ))),
    }
}
