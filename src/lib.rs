//! Dependency-driven asynchronous computation graph with safe cross-thread
//! hand-off.
//!
//! The core abstraction is an *operation*: a graph node that will eventually
//! hold a result (a value, an error code, or a captured fault). Operations
//! depend on other operations; when a dependency finishes, each dependent is
//! notified and may finish in turn, propagating completion through the DAG.
//! It:
//! - Tracks edges strong-down / weak-up, so inputs outlive their readers
//!   while unused dependents stay collectable.
//! - Prevents cycles structurally: dependencies are fixed at construction
//!   and can only be removed afterwards.
//! - Defers callables over operation-valued arguments (`defer(f).until(…)`),
//!   short-circuiting on the first failed argument and capturing panics.
//! - Crosses thread boundaries through a promise / remote-operation pair
//!   riding a multi-producer, single-consumer work queue.
//!
//! Key modules:
//! - `outcome`: the four-state result variant and its failure payloads.
//! - `node`: the untyped graph core (edge bookkeeping, finish propagation).
//! - `operation`: the typed layer with `Operation<T>` handles and
//!   `Source<T>` leaves.
//! - `deferred`: the deferred-call combinator.
//! - `queue`: the work queue with its out-of-band lane.
//! - `remote`: cross-thread delivery (`Promise<T>`, remote and promised
//!   operations).
//!
//! Quick start:
//! 1. Create `Source<T>` leaves and hand their `Operation<T>` handles out.
//! 2. Combine them with `deferred::defer(f).until((a, b))`.
//! 3. Resolve the sources (`set_value` / `set_error` / `set_fault`); results
//!    propagate synchronously to every live dependent.
//! 4. For another thread's results, pair `remote::create` with a `WorkQueue`
//!    the consumer drains.
//!
//! Within one thread, everything runs synchronously to completion on the
//! thread that owns the node; the only blocking call is a blocking dequeue.
//! The queue's release/acquire pairing is what orders a producer's fulfilment
//! before the consumer's observation of the delivered result.

/// The deferred-call combinator over operation-valued arguments.
///
/// Wraps a callable so it fires once every argument operation has finished,
/// with short-circuiting on failed arguments and panic capture.
pub mod deferred;
/// Usage-error taxonomy shared across the crate.
pub mod error;
/// The untyped graph core: the `GraphNode` trait, `NodeCore` edge
/// bookkeeping, and finish propagation.
///
/// Custom node types are built by embedding a core and implementing the
/// dependency-finished hook.
pub mod node;
/// The typed operation layer: `OpCore<T>`, the public `Operation<T>` reader
/// handle, and the settable `Source<T>` leaf.
pub mod operation;
/// The four-state result variant (`Outcome<T>`) and its payload types.
pub mod outcome;
/// The multi-producer, single-consumer work queue with an out-of-band lane.
pub mod queue;
/// Cross-thread result delivery: promises, remote operations, and the
/// promised-operation forwarder.
pub mod remote;
mod sync;
/// Node identity and hasher-pinned collection aliases.
pub mod types;
