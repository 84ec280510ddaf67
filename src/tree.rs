//! Frozen pattern tree.
//!
//! `PatternTree` is the query-side form of a generated tree: a dense arena of
//! canonical patterns with their child links, addressed by `PatternId` in
//! first-visit walk order (the root is `PatternId::ROOT`). It is produced by
//! `PatternGenerator::generate` or `serialize::read_tree` and has no mutating
//! API, so it can be shared between matcher threads behind an `Arc`.
//!
//! # Invariants
//! - Node ids are assigned in pre-order of the first-visit walk from the root.
//! - Every link points into the arena.
//! - No two nodes hold the same pattern.

use crate::arena::{NodeArena, PatternId};
use crate::config::TreeParams;
use crate::fingerprint::{Canonicalizable, HashValue};
use crate::pattern::{Link, Pattern};
use crate::walk::{NodeDescriptor, PatternGraph, TreeWalk, WalkOp};
use std::io::{self, Write};

/// One canonical node of a frozen tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// Canonical bins.
    pub pattern: Pattern,
    /// Child links in generation order.
    pub children: Vec<Link>,
}

/// Output format of `PatternTree::write_dump`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpStyle {
    /// One line per actual pattern: level, then one column per layer.
    Tuples,
    /// ASCII picture of every actual pattern, one row per layer.
    Picture,
}

/// Read-only pattern tree.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternTree {
    params: TreeParams,
    nodes: NodeArena<TreeNode>,
    n_links: usize,
}

impl PatternTree {
    /// Creates an empty tree for `params`; filled by the generator and reader.
    pub(crate) fn with_capacity(params: TreeParams, capacity: usize) -> Self {
        Self {
            params,
            nodes: NodeArena::with_capacity(capacity),
            n_links: 0,
        }
    }

    pub(crate) fn push_node(&mut self, pattern: Pattern) -> PatternId {
        self.nodes.allocate(TreeNode {
            pattern,
            children: Vec::new(),
        })
    }

    pub(crate) fn push_link(&mut self, parent: PatternId, link: Link) {
        self.nodes[parent].children.push(link);
        self.n_links += 1;
    }

    /// Parameters the tree was generated for.
    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    /// Number of canonical patterns.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the tree holds no pattern.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of child links.
    pub fn n_links(&self) -> usize {
        self.n_links
    }

    /// Number of layers.
    pub fn nlayers(&self) -> usize {
        self.params.nlayers()
    }

    /// Number of levels, including the root level.
    pub fn nlevels(&self) -> u32 {
        self.params.max_depth + 1
    }

    /// Node by id.
    pub fn node(&self, id: PatternId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    /// Iterates over all nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = (PatternId, &TreeNode)> {
        self.nodes.iter()
    }

    /// A walk over all levels of this tree.
    pub fn walker(&self) -> TreeWalk {
        TreeWalk::new(self.nlevels())
    }

    /// Fingerprint of the generation parameters.
    pub fn fingerprint(&self) -> HashValue {
        self.params.fingerprint()
    }

    /// Counts the actual patterns of all levels, shifted and mirrored copies included.
    pub fn count_actual_patterns(&self) -> u64 {
        let mut count = 0u64;
        self.walker().walk(self, |_, _| {
            count += 1;
            WalkOp::Recurse
        });
        count
    }

    /// Writes every actual pattern of the tree to `out`.
    ///
    /// Returns the number of patterns written.
    pub fn write_dump<W: Write>(&self, out: &mut W, style: DumpStyle) -> io::Result<u64> {
        let mut count = 0u64;
        let mut result = Ok(());
        self.walker().walk(self, |nd, pattern| {
            result = match style {
                DumpStyle::Tuples => write_tuple(out, nd, pattern),
                DumpStyle::Picture => write_picture(out, nd, pattern),
            };
            if result.is_err() {
                return WalkOp::Abort;
            }
            count += 1;
            WalkOp::Recurse
        });
        result.map(|_| count)
    }
}

fn write_tuple<W: Write>(out: &mut W, nd: &NodeDescriptor, pattern: &Pattern) -> io::Result<()> {
    write!(out, "{:2}", nd.depth)?;
    for bin in nd.bins(pattern) {
        write!(out, " {:5}", bin)?;
    }
    writeln!(out)
}

fn write_picture<W: Write>(out: &mut W, nd: &NodeDescriptor, pattern: &Pattern) -> io::Result<()> {
    let op = 2 * u32::from(nd.mirrored) + nd.link.kind.shift();
    let nbins = 1u64 << nd.depth.min(63);
    for bin in nd.bins(pattern) {
        let bin = u64::from(bin);
        let indent = " ".repeat(nd.depth as usize);
        let left = ".".repeat(bin as usize);
        let right = ".".repeat(nbins.saturating_sub(bin + 1) as usize);
        writeln!(out, "{}-{}{} |{}O{}|", nd.depth, op, indent, left, right)?;
    }
    writeln!(out)
}

impl PatternGraph for PatternTree {
    fn pattern(&self, id: PatternId) -> &Pattern {
        &self.nodes[id].pattern
    }

    fn children(&self, id: PatternId) -> &[Link] {
        &self.nodes[id].children
    }
}
