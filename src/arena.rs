//! Arena storage for pattern nodes.
//!
//! Provides `PatternId` (a dense, total-orderable handle) and `NodeArena`
//! (contiguous, append-only storage). Pattern nodes are shared by many parents
//! and the pattern graph even links the root to itself, so nodes are never
//! owned by their parents; every link is a `PatternId` into one arena.
//!
//! # Determinism
//! - `PatternId` ordering is by its inner `u32`.
//! - Handles are assigned in allocation order and never reused.
//! - Iteration order over nodes is by handle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Dense handle of a pattern node.
///
/// `PatternId(u32)` is `Copy`, `Eq`, `Ord`, `Hash`. The inner value is an
/// index into the arena's node array. The first node allocated in an arena
/// (the tree root) always receives `PatternId::ROOT`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(u32);

impl PatternId {
    /// Handle of the root node.
    pub const ROOT: PatternId = PatternId(0);

    /// Creates a new `PatternId` from a raw `u32`.
    ///
    /// The caller must ensure the index is within bounds of the arena that
    /// holds this node.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw `u32` index.
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns the index as `usize`.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PatternId({})", self.0)
    }
}

/// Append-only contiguous storage for node data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeArena<T> {
    nodes: Vec<T>,
}

impl<T> NodeArena<T> {
    /// Creates a new empty arena.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Creates an empty arena with room for `capacity` nodes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    /// Appends `data` and returns its handle.
    pub fn allocate(&mut self, data: T) -> PatternId {
        let idx = self.nodes.len() as u32;
        self.nodes.push(data);
        PatternId(idx)
    }

    /// Returns a reference to the data stored at `id`, if present.
    pub fn get(&self, id: PatternId) -> Option<&T> {
        self.nodes.get(id.index())
    }

    /// Returns a mutable reference to the data stored at `id`, if present.
    pub fn get_mut(&mut self, id: PatternId) -> Option<&mut T> {
        self.nodes.get_mut(id.index())
    }

    /// Returns `true` if `id` refers to an allocated node.
    pub fn contains(&self, id: PatternId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Returns the number of allocated nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no node has been allocated.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over all nodes in handle order.
    ///
    /// Yields `(PatternId, &T)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (PatternId, &T)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, data)| (PatternId(idx as u32), data))
    }

    /// Removes all nodes. Previously issued handles become invalid.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

impl<T> Default for NodeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<PatternId> for NodeArena<T> {
    type Output = T;

    fn index(&self, id: PatternId) -> &T {
        &self.nodes[id.index()]
    }
}

impl<T> IndexMut<PatternId> for NodeArena<T> {
    fn index_mut(&mut self, id: PatternId) -> &mut T {
        &mut self.nodes[id.index()]
    }
}
