//! Generic depth-first walk over a pattern graph.
//!
//! Every consumer of the tree (freezing, counting, dumping, serializing,
//! matching) is a callback handed to `TreeWalk::walk`. The callback sees one
//! `NodeDescriptor` per link followed and decides with a `WalkOp` whether the
//! walk descends into the node's children. Accumulated state lives in the
//! closure's captures.
//!
//! The walk is iterative, so deep or shared graphs cannot overflow the call
//! stack. Nodes are visited in pre-order with children in link order.

use crate::arena::PatternId;
use crate::pattern::{Link, LinkType, Pattern};

/// Read access to a graph of canonical patterns.
pub trait PatternGraph {
    /// Canonical pattern of a node.
    fn pattern(&self, id: PatternId) -> &Pattern;

    /// Child links of a node, in generation order.
    fn children(&self, id: PatternId) -> &[Link];

    /// Entry node of the walk.
    fn root(&self) -> PatternId {
        PatternId::ROOT
    }
}

/// One step of a walk: a canonical node reached through a specific link.
///
/// Together with its canonical pattern, a descriptor determines the actual
/// bins the node stands for at this position of the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDescriptor {
    /// Link through which the node was reached.
    pub link: Link,
    /// Canonical parent node; `None` at the root.
    pub parent: Option<PatternId>,
    /// Tree level; the root is level 0.
    pub depth: u32,
    /// Offset of the actual pattern from the canonical one, in bins of this
    /// level. Counted from the far edge of the detector when `mirrored`.
    pub shift: u32,
    /// The actual pattern is the mirror image of the canonical one.
    pub mirrored: bool,
}

impl NodeDescriptor {
    /// Descriptor of the root of a walk.
    pub fn root(id: PatternId) -> Self {
        Self {
            link: Link::new(id, LinkType::Plain),
            parent: None,
            depth: 0,
            shift: 0,
            mirrored: false,
        }
    }

    /// Canonical node this descriptor refers to.
    #[inline]
    pub fn id(&self) -> PatternId {
        self.link.pattern
    }

    /// Descriptor of the child reached through `link`.
    ///
    /// `child_width` is the width of the child's canonical pattern; it places
    /// the reflected pattern when the link is mirrored.
    pub fn child(&self, link: Link, child_width: u32) -> Self {
        let depth = self.depth + 1;
        let shift = self.shift.wrapping_mul(2).wrapping_add(link.kind.shift());
        let shift = if link.kind.is_mirrored() {
            last_bin(depth).wrapping_sub(shift).wrapping_sub(child_width)
        } else {
            shift
        };
        Self {
            link,
            parent: Some(self.id()),
            depth,
            shift,
            mirrored: self.mirrored ^ link.kind.is_mirrored(),
        }
    }

    /// Actual bin of `layer`.
    ///
    /// A mirrored descriptor counts `shift + bits` from the far edge of the
    /// detector at this level.
    #[inline]
    pub fn bin(&self, pattern: &Pattern, layer: usize) -> u32 {
        let bin = u32::from(pattern[layer]).wrapping_add(self.shift);
        if self.mirrored {
            last_bin(self.depth).wrapping_sub(bin)
        } else {
            bin
        }
    }

    /// Actual bins of all layers.
    pub fn bins(&self, pattern: &Pattern) -> Vec<u32> {
        (0..pattern.nlayers()).map(|i| self.bin(pattern, i)).collect()
    }
}

/// Highest bin index at `depth`.
#[inline]
pub(crate) fn last_bin(depth: u32) -> u32 {
    1u32.checked_shl(depth).map_or(u32::MAX, |n| n - 1)
}

/// What the walk does after visiting a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOp {
    /// Visit the children if they lie within the level limit.
    Recurse,
    /// Visit the children regardless of the level limit.
    RecurseUnconditionally,
    /// Continue with the next sibling.
    SkipChildren,
    /// Stop the walk.
    Abort,
}

/// How a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Every node the callback asked for was visited.
    Completed,
    /// The callback returned `WalkOp::Abort`.
    Aborted,
}

/// Depth-first walk limited to a number of tree levels.
#[derive(Debug, Clone, Copy)]
pub struct TreeWalk {
    nlevels: u32,
}

impl TreeWalk {
    /// Creates a walk over levels `0..nlevels`.
    pub fn new(nlevels: u32) -> Self {
        Self { nlevels }
    }

    /// Number of levels `WalkOp::Recurse` descends into.
    pub fn nlevels(&self) -> u32 {
        self.nlevels
    }

    /// Walks `graph` from its root, calling `visit` for every node reached.
    pub fn walk<G, F>(&self, graph: &G, mut visit: F) -> WalkOutcome
    where
        G: PatternGraph + ?Sized,
        F: FnMut(&NodeDescriptor, &Pattern) -> WalkOp,
    {
        let mut stack = vec![NodeDescriptor::root(graph.root())];
        while let Some(nd) = stack.pop() {
            let descend = match visit(&nd, graph.pattern(nd.id())) {
                WalkOp::Recurse => nd.depth + 1 < self.nlevels,
                WalkOp::RecurseUnconditionally => true,
                WalkOp::SkipChildren => false,
                WalkOp::Abort => return WalkOutcome::Aborted,
            };
            if descend {
                // reversed so the first child is popped first
                stack.extend(
                    graph
                        .children(nd.id())
                        .iter()
                        .rev()
                        .map(|&l| nd.child(l, graph.pattern(l.pattern).width().unsigned_abs())),
                );
            }
        }
        WalkOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct TestGraph {
        nodes: Vec<(Pattern, Vec<Link>)>,
    }

    impl PatternGraph for TestGraph {
        fn pattern(&self, id: PatternId) -> &Pattern {
            &self.nodes[id.index()].0
        }
        fn children(&self, id: PatternId) -> &[Link] {
            &self.nodes[id.index()].1
        }
    }

    const ROOT: PatternId = PatternId::ROOT;
    const A: PatternId = PatternId::new(1);

    // root -> (root, Shifted), (A, Plain); A -> (A, Shifted)
    fn cyclic_graph() -> TestGraph {
        TestGraph {
            nodes: vec![
                (
                    Pattern::root(2),
                    vec![Link::new(ROOT, LinkType::Shifted), Link::new(A, LinkType::Plain)],
                ),
                (
                    Pattern::from_bits(vec![0, 1]),
                    vec![Link::new(A, LinkType::Shifted)],
                ),
            ],
        }
    }

    #[test]
    fn preorder_within_level_limit() {
        let g = cyclic_graph();
        let mut seen = Vec::new();
        let outcome = TreeWalk::new(3).walk(&g, |nd, _| {
            seen.push((nd.id(), nd.depth, nd.shift));
            WalkOp::Recurse
        });
        assert_eq!(outcome, WalkOutcome::Completed);
        assert_eq!(
            seen,
            vec![
                (ROOT, 0, 0),
                (ROOT, 1, 1),
                (ROOT, 2, 3),
                (A, 2, 2),
                (A, 1, 0),
                (A, 2, 1),
            ]
        );
    }

    #[test]
    fn skip_and_abort() {
        let g = cyclic_graph();
        let mut n = 0;
        TreeWalk::new(3).walk(&g, |_, _| {
            n += 1;
            WalkOp::SkipChildren
        });
        assert_eq!(n, 1);

        let mut n = 0;
        let outcome = TreeWalk::new(3).walk(&g, |_, _| {
            n += 1;
            if n == 3 {
                WalkOp::Abort
            } else {
                WalkOp::Recurse
            }
        });
        assert_eq!(outcome, WalkOutcome::Aborted);
        assert_eq!(n, 3);
    }

    #[test]
    fn first_visit_walk_terminates_on_cycles() {
        let g = cyclic_graph();
        let mut visited = HashSet::new();
        let mut n = 0;
        let outcome = TreeWalk::new(1).walk(&g, |nd, _| {
            n += 1;
            if visited.insert(nd.id()) {
                WalkOp::RecurseUnconditionally
            } else {
                WalkOp::SkipChildren
            }
        });
        assert_eq!(outcome, WalkOutcome::Completed);
        assert_eq!(n, 4);
        assert_eq!(visited.len(), 2);
    }

    #[test]
    fn actual_bins_follow_links() {
        let b = Pattern::from_bits(vec![0, 0, 1]);
        let e = Pattern::from_bits(vec![0, 1, 3]);
        let root = NodeDescriptor::root(ROOT);
        assert_eq!(root.bins(&Pattern::root(3)), vec![0, 0, 0]);

        let mirrored = root.child(Link::new(PatternId::new(2), LinkType::Mirrored), 1);
        assert!(mirrored.mirrored);
        assert_eq!(mirrored.parent, Some(ROOT));
        assert_eq!(mirrored.bins(&b), vec![1, 1, 0]);

        // children of [1,1,0] at level 2
        let plain = mirrored.child(Link::new(PatternId::new(3), LinkType::Plain), 3);
        assert_eq!(plain.bins(&e), vec![3, 2, 0]);
        let shifted = mirrored.child(Link::new(PatternId::new(2), LinkType::Shifted), 1);
        assert_eq!(shifted.shift, 1);
        assert_eq!(shifted.bins(&b), vec![2, 2, 1]);

        let right = root
            .child(Link::new(ROOT, LinkType::Shifted), 0)
            .child(Link::new(PatternId::new(2), LinkType::Shifted), 1);
        assert_eq!(right.shift, 3);
        assert_eq!(right.bins(&b), vec![3, 3, 4]);

        // mirrored below a repeated root stays next to its parent
        let low = root
            .child(Link::new(ROOT, LinkType::Plain), 0)
            .child(Link::new(PatternId::new(2), LinkType::Mirrored), 1);
        assert_eq!(low.bins(&b), vec![1, 1, 0]);
        let high = root
            .child(Link::new(ROOT, LinkType::Shifted), 0)
            .child(Link::new(PatternId::new(2), LinkType::Mirrored), 1);
        assert_eq!(high.bins(&b), vec![3, 3, 2]);
        assert_eq!(last_bin(2), 3);
        assert_eq!(last_bin(40), u32::MAX);
    }
}
