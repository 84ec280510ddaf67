//! Pattern tree builder.
//!
//! Starting from the all-zero root pattern, the generator doubles the bin
//! resolution level by level. Every candidate child is looked up in a hash
//! registry first, so each canonical pattern is stored once and shared by all
//! parents that produce it. New candidates must pass the slope and the
//! straight-line test (`geometry`); existing ones are re-checked against the
//! slope limit when they are reached at a shallower level than before.
//!
//! The resulting build graph has cycles (the root is its own shifted child).
//! `generate` freezes it into a compact `PatternTree` with a first-visit walk.

mod child_iter;
mod geometry;
mod registry;
mod stats;

pub use geometry::{LineGeometry, LINE_TOLERANCE};
pub use stats::Statistics;

use crate::arena::{NodeArena, PatternId};
use crate::config::{ConfigError, TreeParams};
use crate::pattern::{Bin, Link, Pattern};
use crate::tree::PatternTree;
use crate::walk::{PatternGraph, TreeWalk, WalkOp};
use child_iter::ChildIter;
use log::{debug, info};
use registry::Registry;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A canonical pattern of the build graph.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildNode {
    pattern: Pattern,
    children: Vec<Link>,
    min_depth: Option<u32>,
}

impl BuildNode {
    fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            children: Vec::new(),
            min_depth: None,
        }
    }

    /// Canonical bins.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Child links in generation order.
    pub fn children(&self) -> &[Link] {
        &self.children
    }

    /// Shallowest level at which the pattern has been used, if any.
    ///
    /// The slope limit is loosest at this level. Reaching the pattern at a
    /// shallower level requires a new slope test and extends its subtree.
    pub fn min_depth(&self) -> Option<u32> {
        self.min_depth
    }

    fn used_at_depth(&mut self, depth: u32) {
        self.min_depth = Some(self.min_depth.map_or(depth, |d| d.min(depth)));
    }
}

/// Builds pattern trees.
///
/// The generator keeps the build graph of its last run for inspection
/// (`find`, `node`, `statistics`); `generate` replaces it.
#[derive(Debug, Clone)]
pub struct PatternGenerator {
    nodes: NodeArena<BuildNode>,
    registry: Registry,
    nlevels: u32,
    stats: Statistics,
}

impl Default for PatternGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternGenerator {
    /// Creates an empty generator.
    pub fn new() -> Self {
        Self {
            nodes: NodeArena::new(),
            registry: Registry::new(0),
            nlevels: 0,
            stats: Statistics::default(),
        }
    }

    /// Generates the pattern tree for `params`.
    ///
    /// Fails without touching the previous build if the parameters are invalid.
    pub fn generate(&mut self, params: &TreeParams) -> Result<PatternTree, ConfigError> {
        let normalized = params.normalize()?;
        let geometry = LineGeometry::new(&normalized);

        self.nodes.clear();
        self.nlevels = normalized.nlevels;
        // 2^(nlevels-1) * 2^(nplanes-2) bounds the pattern count, so this size
        // gives chains of about 2^(nplanes-2)
        self.registry = Registry::new(self.nlevels - 1);

        let start = Instant::now();
        let root = self.add_node(Pattern::root(params.nlayers()));
        self.make_child_nodes(&geometry, root, 1);
        self.stats = self.calc_statistics(start.elapsed());

        info!(
            "pattern tree: {} patterns, {} links, {} levels, built in {:.3} s",
            self.stats.n_patterns,
            self.stats.n_links,
            self.nlevels,
            self.stats.build_time.as_secs_f64()
        );
        debug!(
            "build statistics ({} hash buckets):\n{}",
            self.registry.len(),
            self.stats
        );

        Ok(self.freeze(params.clone()))
    }

    fn add_node(&mut self, pattern: Pattern) -> PatternId {
        let id = self.nodes.allocate(BuildNode::new(pattern));
        self.registry.insert(&self.nodes[id].pattern, id);
        id
    }

    fn make_child_nodes(&mut self, geometry: &LineGeometry, parent: PatternId, depth: u32) {
        // Generating children at `depth` means the parent is used one level up
        if depth > 0 {
            self.nodes[parent].used_at_depth(depth - 1);
        }
        if depth >= self.nlevels {
            return;
        }

        if self.nodes[parent].children.is_empty() {
            let parent_pattern = self.nodes[parent].pattern.clone();
            for (child, kind) in ChildIter::new(&parent_pattern) {
                let link = match self.find(&child) {
                    Some(found) => {
                        let node = &self.nodes[found];
                        // Patterns only tested at deeper levels face a tighter
                        // slope limit here
                        let valid = node.min_depth.is_some_and(|d| depth >= d)
                            || geometry.slope_ok(&node.pattern, depth);
                        valid.then(|| Link::new(found, kind))
                    }
                    None if geometry.slope_ok(&child, depth) && geometry.line_ok(&child) => {
                        Some(Link::new(self.add_node(child), kind))
                    }
                    None => None,
                };
                if let Some(link) = link {
                    self.nodes[parent].children.push(link);
                }
            }
        }

        // A non-empty child list never changes below, so indexing stays valid
        let nchildren = self.nodes[parent].children.len();
        for k in 0..nchildren {
            let child = self.nodes[parent].children[k].pattern;
            let node = &self.nodes[child];
            // Extend subtrees first built from a deeper position
            if node.children.is_empty() || node.min_depth.map_or(true, |d| d > depth) {
                self.make_child_nodes(geometry, child, depth + 1);
            }
        }
    }

    fn calc_statistics(&self, build_time: Duration) -> Statistics {
        let mut stats = Statistics {
            n_patterns: self.nodes.len(),
            max_hash_depth: self.registry.max_chain_length(),
            n_hash_bytes: self.registry.heap_bytes(),
            build_time,
            ..Statistics::default()
        };
        for (_, node) in self.nodes.iter() {
            stats.n_links += node.children.len();
            stats.max_child_list_length = stats.max_child_list_length.max(node.children.len());
        }
        let nlayers = self.nodes.get(PatternId::ROOT).map_or(0, |n| n.pattern.nlayers());
        stats.n_bytes = stats.n_patterns * std::mem::size_of::<BuildNode>()
            + stats.n_patterns * nlayers * std::mem::size_of::<Bin>()
            + stats.n_links * std::mem::size_of::<Link>();
        stats
    }

    /// Copies the build graph into a `PatternTree`, numbering nodes in
    /// first-visit order.
    fn freeze(&self, params: TreeParams) -> PatternTree {
        let mut tree = PatternTree::with_capacity(params, self.nodes.len());
        let mut index: HashMap<PatternId, PatternId> = HashMap::with_capacity(self.nodes.len());
        TreeWalk::new(self.nlevels).walk(self, |nd, pattern| {
            let (id, first_visit) = match index.get(&nd.id()) {
                Some(&id) => (id, false),
                None => {
                    let id = tree.push_node(pattern.clone());
                    index.insert(nd.id(), id);
                    (id, true)
                }
            };
            if let Some(parent) = nd.parent.and_then(|p| index.get(&p).copied()) {
                tree.push_link(parent, Link::new(id, nd.link.kind));
            }
            if first_visit {
                WalkOp::RecurseUnconditionally
            } else {
                WalkOp::SkipChildren
            }
        });
        tree
    }

    /// Looks up the build node holding `pattern`.
    pub fn find(&self, pattern: &Pattern) -> Option<PatternId> {
        if self.nodes.is_empty() {
            return None;
        }
        self.registry.find(&self.nodes, pattern, |n| &n.pattern)
    }

    /// Build node by id.
    pub fn node(&self, id: PatternId) -> Option<&BuildNode> {
        self.nodes.get(id)
    }

    /// Number of patterns in the build graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if nothing has been built.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Statistics of the last build.
    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }
}

impl PatternGraph for PatternGenerator {
    fn pattern(&self, id: PatternId) -> &Pattern {
        &self.nodes[id].pattern
    }

    fn children(&self, id: PatternId) -> &[Link] {
        &self.nodes[id].children
    }
}
