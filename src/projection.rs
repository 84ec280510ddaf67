//! Per-projection track finding.
//!
//! A `Projection` owns the event-level state of one wire orientation: the
//! hitpattern and the allowed layer combinations. The pattern tree is shared;
//! any number of projections, on any number of threads, may use one tree.

use crate::config::{ConfigError, ProjectionConfig};
use crate::hit::LayerHits;
use crate::hitpattern::{Hitpattern, LayerCombos};
use crate::matcher::{find_matches, PatternMatch};
use crate::road::{make_roads, Road};
use crate::tree::PatternTree;
use log::debug;
use std::sync::Arc;

/// Output of `Projection::track`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackCandidates {
    /// Tree matches sorted by bins, with their road usage.
    pub matches: Vec<PatternMatch>,
    /// Roads built from the matches.
    pub roads: Vec<Road>,
    /// Number of tree nodes compared with the hitpattern.
    pub comparisons: u64,
}

/// Track finder for one projection.
#[derive(Debug, Clone)]
pub struct Projection {
    config: ProjectionConfig,
    tree: Arc<PatternTree>,
    hitpattern: Hitpattern,
    combos: LayerCombos,
}

impl Projection {
    /// Creates a projection using `tree`.
    ///
    /// Fails if the configuration is invalid or the tree was generated for
    /// other parameters than `config.tree`.
    pub fn new(config: ProjectionConfig, tree: Arc<PatternTree>) -> Result<Self, ConfigError> {
        let normalized = config.validate()?;
        if tree.params() != &config.tree {
            return Err(ConfigError::TreeMismatch);
        }
        let nlayers = config.tree.nlayers();
        let hitpattern = Hitpattern::new(normalized.nlevels, nlayers, config.origin, config.tree.width);
        let combos = LayerCombos::with_max_missing(nlayers, config.max_missing_layers);
        Ok(Self {
            config,
            tree,
            hitpattern,
            combos,
        })
    }

    /// Configuration this projection was created with.
    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    /// Shared pattern tree.
    pub fn tree(&self) -> &Arc<PatternTree> {
        &self.tree
    }

    /// Hitpattern of the last event.
    pub fn hitpattern(&self) -> &Hitpattern {
        &self.hitpattern
    }

    /// Allowed layer combinations.
    pub fn layer_combos(&self) -> &LayerCombos {
        &self.combos
    }

    /// Allowed layer combinations, for tuning beyond the missing-layer count.
    pub fn layer_combos_mut(&mut self) -> &mut LayerCombos {
        &mut self.combos
    }

    /// Number of layers per event.
    pub fn nlayers(&self) -> usize {
        self.tree.nlayers()
    }

    /// Finds track candidates in one event.
    ///
    /// `layers` holds the hits of every layer, in z order. Plane numbers
    /// must count the planes of all layers from zero.
    ///
    /// # Panics
    ///
    /// Panics if the number of layers differs from the tree's.
    pub fn track(&mut self, layers: &[LayerHits]) -> TrackCandidates {
        assert_eq!(
            layers.len(),
            self.nlayers(),
            "expected hits of {} layers",
            self.nlayers()
        );

        self.hitpattern.clear();
        let mut nhits = 0;
        for (i, layer) in layers.iter().enumerate() {
            nhits += self.hitpattern.fill_layer(
                i,
                layer,
                self.config.pair_max_dist,
                self.config.pairs_only,
            );
        }

        let found = find_matches(&self.tree, &self.hitpattern, &self.combos);
        let mut matches = found.matches;
        let nplanes = layers.iter().map(LayerHits::nplanes).sum();
        let roads = make_roads(&mut matches, nplanes, self.config.pattern_max_dist);

        debug!(
            "{} hits, {} comparisons, {} matches, {} roads",
            nhits,
            found.comparisons,
            matches.len(),
            roads.len()
        );
        TrackCandidates {
            matches,
            roads,
            comparisons: found.comparisons,
        }
    }
}
