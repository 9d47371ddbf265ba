use crate::node::{NodeHandle, WeakNodeHandle};
use indexmap::IndexMap as _IndexMap;
use rustc_hash::FxBuildHasher;
use std::sync::{Arc, Weak};

/// Stable identity of a graph node.
///
/// A node's identity is the address of its shared allocation, which is stable
/// for the node's whole lifetime and is what the edge maps key on. Two
/// handles yield the same `NodeId` iff they refer to the same node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn of(node: &NodeHandle) -> Self {
        Self(Arc::as_ptr(node) as *const () as usize)
    }

    pub(crate) fn of_weak(node: &WeakNodeHandle) -> Self {
        Self(Weak::as_ptr(node) as *const () as usize)
    }
}

/// `IndexMap` type with fast hasher.
///
/// Insertion-ordered, so edge iteration (and therefore notification fan-out)
/// is deterministic.
pub type IndexMap<K, V> = _IndexMap<K, V, FxBuildHasher>;
