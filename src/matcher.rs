//! Tree-walk matcher.
//!
//! Walks a pattern tree against one event's hitpattern. A node survives if
//! the layers whose bins are set form an allowed `LayerCombos` mask; its
//! subtree is pruned otherwise. Nodes surviving at the finest level become
//! `PatternMatch`es carrying the hits of their bins.

use crate::hit::HitSet;
use crate::hitpattern::{Hitpattern, LayerCombos};
use crate::tree::PatternTree;
use crate::walk::{NodeDescriptor, WalkOp};

/// How much of a match has been consumed by roads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Usage {
    /// Not part of any road yet.
    #[default]
    Unused,
    /// Part of a road, but some of its hits are not common to the road.
    PartiallyUsed,
    /// All hits are common hits of a road; never seeds or joins another road.
    FullyUsed,
}

/// A finest-level tree node matching the hitpattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    /// Where in the tree the match was found.
    pub descriptor: NodeDescriptor,
    /// Actual bins, one per layer.
    pub bins: Vec<u32>,
    /// Hits in the matched bins.
    pub hits: HitSet,
    /// Road usage.
    pub usage: Usage,
}

/// Result of one matcher walk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matches {
    /// Matches sorted by bins.
    pub matches: Vec<PatternMatch>,
    /// Number of tree nodes compared with the hitpattern.
    pub comparisons: u64,
}

/// Finds all patterns of `tree` consistent with `hitpattern`.
///
/// # Panics
///
/// Panics if the hitpattern, the combos and the tree disagree on levels or layers.
pub fn find_matches(tree: &PatternTree, hitpattern: &Hitpattern, combos: &LayerCombos) -> Matches {
    assert_eq!(hitpattern.nlevels(), tree.nlevels(), "hitpattern/tree level mismatch");
    assert_eq!(hitpattern.nlayers(), tree.nlayers(), "hitpattern/tree layer mismatch");
    assert_eq!(combos.nlayers(), tree.nlayers(), "layer combos/tree layer mismatch");

    let last = tree.nlevels() - 1;
    let mut result = Matches::default();
    tree.walker().walk(tree, |nd, pattern| {
        result.comparisons += 1;
        let bins = nd.bins(pattern);
        let mask = bins
            .iter()
            .enumerate()
            .filter(|&(layer, &bin)| hitpattern.is_set(layer, nd.depth, bin))
            .fold(0u32, |m, (layer, _)| m | 1 << layer);
        if !combos.allows(mask) {
            return WalkOp::SkipChildren;
        }
        if nd.depth < last {
            return WalkOp::Recurse;
        }
        let mut hits = HitSet::new();
        for (layer, &bin) in bins.iter().enumerate() {
            hitpattern.collect_hits(layer, bin, &mut hits);
        }
        result.matches.push(PatternMatch {
            descriptor: *nd,
            bins,
            hits,
            usage: Usage::Unused,
        });
        WalkOp::SkipChildren
    });
    result.matches.sort_by(|a, b| a.bins.cmp(&b.bins));
    result
}
