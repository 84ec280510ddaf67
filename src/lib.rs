//! TreeSearch: pattern-tree track finding for multi-layer detectors.
//!
//! A straight track crossing a stack of position-sensitive layers fires one
//! bin per layer. This crate precomputes every bin combination a straight
//! track with bounded slope can produce, at successively doubled resolution,
//! and stores them as a pattern tree. Per event, the tree is walked against a
//! bitmap of fired bins; subtrees whose coarse bins do not fire are pruned,
//! so only a small part of the tree is visited. Matches are grouped into
//! roads, the track candidates handed to a line fit.
//!
//! - `generator` builds the tree. Each canonical pattern is stored once and
//!   linked from every parent producing it, shifted or mirrored.
//! - `serialize` persists the tree; shared nodes are written once.
//! - `matcher` walks the tree against a `Hitpattern`; `road` groups matches.
//! - `pairs` merges the hits of two partner planes into one layer.
//! - `projection` ties the per-event steps together.
//!
//! A `PatternTree` is immutable once built and can be shared between threads.
//!
//! # Example
//!
//! ```
//! use treesearch::prelude::*;
//! use std::sync::Arc;
//!
//! let params = TreeParams::new(3, 8.0, vec![0.0, 1.0, 2.0, 3.0], 1.0);
//! let tree = Arc::new(PatternGenerator::new().generate(&params)?);
//!
//! let mut config = ProjectionConfig::new(params);
//! config.origin = 0.0;
//! let mut projection = Projection::new(config, tree)?;
//!
//! let layers: Vec<LayerHits> = (0..4u16)
//!     .map(|plane| {
//!         let hit = Hit::new(PlaneType::X, plane, 3, 3.5, 0.0, 0.1);
//!         LayerHits::single(PlaneHits::from_hits(PlaneType::X, plane, vec![hit]))
//!     })
//!     .collect();
//! let found = projection.track(&layers);
//! assert!(found.matches.iter().any(|m| m.bins == vec![3, 3, 3, 3]));
//! assert!(found.roads.iter().any(|r| r.all_hits().len() == 4));
//! # Ok::<(), ConfigError>(())
//! ```

pub mod arena;
pub mod config;
pub mod fingerprint;
pub mod generator;
pub mod hit;
pub mod hitpattern;
pub mod matcher;
pub mod pairs;
pub mod pattern;
pub mod projection;
pub mod road;
pub mod serialize;
pub mod tree;
pub mod walk;

pub use config::{ConfigError, ProjectionConfig, TreeParams};
pub use generator::PatternGenerator;
pub use projection::{Projection, TrackCandidates};
pub use serialize::TreeIoError;
pub use tree::PatternTree;

/// Prelude for convenient usage.
pub mod prelude {
    pub use crate::arena::PatternId;
    pub use crate::config::{ConfigError, ProjectionConfig, TreeParams};
    pub use crate::fingerprint::{Canonicalizable, HashValue};
    pub use crate::generator::{PatternGenerator, Statistics};
    pub use crate::hit::{Hit, HitId, HitSet, LayerHits, PlaneHits, PlaneType};
    pub use crate::hitpattern::{Hitpattern, LayerCombos};
    pub use crate::matcher::{find_matches, PatternMatch, Usage};
    pub use crate::pairs::HitPairIter;
    pub use crate::pattern::{Link, LinkType, Pattern};
    pub use crate::projection::{Projection, TrackCandidates};
    pub use crate::road::{make_roads, Road};
    pub use crate::serialize::{
        load_tree, read_tree, read_tree_checked, save_tree, write_tree, TreeIoError,
    };
    pub use crate::tree::{DumpStyle, PatternTree};
    pub use crate::walk::{NodeDescriptor, PatternGraph, TreeWalk, WalkOp, WalkOutcome};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;

    /// Three layers at z = 0, 1, 2, two levels below the root, slope 1.
    #[test]
    fn small_tree_end_to_end() {
        let params = TreeParams::new(2, 2.0, vec![0.0, 1.0, 2.0], 1.0);
        let mut gen = PatternGenerator::new();
        let tree = gen.generate(&params).unwrap();
        assert_eq!(tree.len(), 6);

        // root children that pass the line test
        let root = tree.node(PatternId::ROOT).unwrap();
        let children: Vec<(Vec<u16>, LinkType)> = root
            .children
            .iter()
            .map(|l| (tree.pattern(l.pattern).bits().to_vec(), l.kind))
            .collect();
        assert_eq!(
            children,
            vec![
                (vec![0, 0, 0], LinkType::Shifted),
                (vec![0, 1, 1], LinkType::Plain),
                (vec![0, 0, 1], LinkType::Plain),
                (vec![0, 0, 1], LinkType::Mirrored),
                (vec![0, 1, 1], LinkType::Mirrored),
                (vec![0, 0, 0], LinkType::Plain),
            ]
        );

        let mut buf = Vec::new();
        write_tree(&tree, &mut buf).unwrap();
        let read = read_tree_checked(&mut buf.as_slice(), &params).unwrap();
        assert_eq!(read, tree);
    }

    #[test]
    fn persisted_tree_finds_the_same_tracks() {
        let params = TreeParams::new(5, 32.0, vec![0.0, 1.0, 2.5, 4.0], 2.0);
        let tree = Arc::new(PatternGenerator::new().generate(&params).unwrap());
        let mut buf = Vec::new();
        write_tree(&tree, &mut buf).unwrap();
        let read = Arc::new(read_tree(&mut buf.as_slice()).unwrap());

        let mut config = ProjectionConfig::new(params);
        config.origin = 0.0;
        let mut a = Projection::new(config.clone(), tree).unwrap();
        let mut b = Projection::new(config, read).unwrap();

        // two tracks, one with a hit missing in layer 2
        let z = [0.0, 1.0, 2.5, 4.0];
        let layers: Vec<LayerHits> = (0..4u16)
            .map(|plane| {
                let zi = z[plane as usize];
                let mut hits = vec![Hit::new(PlaneType::U, plane, 0, 5.3 + 1.5 * zi, 0.0, 0.2)];
                if plane != 2 {
                    hits.push(Hit::new(PlaneType::U, plane, 1, 24.6 - 2.0 * zi, 0.0, 0.2));
                }
                LayerHits::single(PlaneHits::from_hits(PlaneType::U, plane, hits))
            })
            .collect();

        let found = a.track(&layers);
        assert!(!found.matches.is_empty());
        assert!(!found.roads.is_empty());
        assert_eq!(b.track(&layers), found);
    }

    #[test]
    fn paired_planes_feed_one_layer() {
        let params = TreeParams::new(3, 8.0, vec![0.0, 1.0, 2.0], 1.0);
        let tree = Arc::new(PatternGenerator::new().generate(&params).unwrap());
        let mut config = ProjectionConfig::new(params);
        config.origin = 0.0;
        config.max_missing_layers = 0;
        config.pair_max_dist = 0.2;
        config.pairs_only = true;
        let mut projection = Projection::new(config, tree).unwrap();

        // planes 0/1, 2/3 and 4/5 form the three layers
        let layers: Vec<LayerHits> = (0..3u16)
            .map(|layer| {
                let plane = |n: u16, x: f64| {
                    let hit = Hit::new(PlaneType::V, n, 0, x, 0.0, 0.05);
                    PlaneHits::from_hits(PlaneType::V, n, vec![hit])
                };
                LayerHits::paired(plane(2 * layer, 5.4), plane(2 * layer + 1, 5.6))
            })
            .collect();
        let found = projection.track(&layers);
        assert_eq!(found.matches.len(), 1);
        assert_eq!(found.matches[0].bins, vec![5, 5, 5]);
        assert_eq!(found.roads.len(), 1);
        assert_eq!(found.roads[0].common_hits().len(), 6);
    }
}
