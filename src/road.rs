//! Road builder.
//!
//! A road groups pattern matches that share enough hits to be one track
//! candidate. It keeps two hit sets: the hits common to every contributing
//! match and the union of all their hits. A match joins a road only if the
//! common hits still cover the planes well enough afterwards (`check_match`).
//! `finish` seals the road and marks each contributing match fully or
//! partially used.

use crate::hit::HitSet;
use crate::matcher::{PatternMatch, Usage};
use log::debug;

/// Planes a road's common hits may miss.
pub const MAX_MISSING_PLANES: usize = 1;

/// A track candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Road {
    nplanes: usize,
    common_hits: HitSet,
    all_hits: HitSet,
    /// Smallest bins of the first and the last layer.
    left: [u32; 2],
    /// Largest bins of the first and the last layer.
    right: [u32; 2],
    patterns: Vec<usize>,
    finished: bool,
}

impl Road {
    /// Creates an empty road for a projection with `nplanes` planes.
    pub fn new(nplanes: usize) -> Self {
        Self {
            nplanes,
            common_hits: HitSet::new(),
            all_hits: HitSet::new(),
            left: [u32::MAX; 2],
            right: [0; 2],
            patterns: Vec::new(),
            finished: false,
        }
    }

    /// Tests whether `hits` cover all planes but at most `MAX_MISSING_PLANES`.
    pub fn check_match(&self, hits: &HitSet) -> bool {
        let mut seen = vec![false; self.nplanes];
        for id in hits {
            if let Some(slot) = seen.get_mut(usize::from(id.plane)) {
                *slot = true;
            }
        }
        seen.iter().filter(|&&s| !s).count() <= MAX_MISSING_PLANES
    }

    /// Offers match `index` to the road. Returns true if it was added.
    ///
    /// # Panics
    ///
    /// Panics if the road is finished.
    pub fn add(&mut self, index: usize, m: &PatternMatch) -> bool {
        assert!(!self.finished, "road is finished");

        if self.patterns.is_empty() {
            if !self.check_match(&m.hits) {
                return false;
            }
            self.common_hits = m.hits.clone();
            self.all_hits = m.hits.clone();
        } else {
            let common: HitSet = self.common_hits.intersection(&m.hits).copied().collect();
            if common.len() < self.common_hits.len() {
                if !self.check_match(&common) {
                    return false;
                }
                self.common_hits = common;
            }
            self.all_hits.extend(m.hits.iter().copied());
        }
        self.patterns.push(index);

        if let (Some(&first), Some(&last)) = (m.bins.first(), m.bins.last()) {
            self.left = [self.left[0].min(first), self.left[1].min(last)];
            self.right = [self.right[0].max(first), self.right[1].max(last)];
        }
        true
    }

    /// Seals the road and records in `matches` how much of each
    /// contributing match it used.
    ///
    /// # Panics
    ///
    /// Panics if a contributing match was already fully used by another road.
    pub fn finish(&mut self, matches: &mut [PatternMatch]) {
        for &i in &self.patterns {
            let m = &mut matches[i];
            assert_ne!(m.usage, Usage::FullyUsed, "fully used match in a new road");
            m.usage = if m.hits.is_subset(&self.common_hits) {
                Usage::FullyUsed
            } else {
                Usage::PartiallyUsed
            };
        }
        self.finished = true;
    }

    /// Number of planes of the projection.
    pub fn nplanes(&self) -> usize {
        self.nplanes
    }

    /// Hits shared by all contributing matches.
    pub fn common_hits(&self) -> &HitSet {
        &self.common_hits
    }

    /// Hits of any contributing match.
    pub fn all_hits(&self) -> &HitSet {
        &self.all_hits
    }

    /// Smallest bins of the first and the last layer.
    pub fn left(&self) -> [u32; 2] {
        self.left
    }

    /// Largest bins of the first and the last layer.
    pub fn right(&self) -> [u32; 2] {
        self.right
    }

    /// Indices of the contributing matches.
    pub fn patterns(&self) -> &[usize] {
        &self.patterns
    }

    /// Whether no match has been added yet.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `finish` has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Groups `matches` (sorted by bins) into roads.
///
/// Every match not yet fully used seeds a road. The matches following it
/// are offered to the road as long as their first-layer bin lies within
/// `pattern_max_dist` of the road's right edge.
pub fn make_roads(matches: &mut [PatternMatch], nplanes: usize, pattern_max_dist: u32) -> Vec<Road> {
    let mut roads = Vec::new();
    for seed in 0..matches.len() {
        if matches[seed].usage == Usage::FullyUsed {
            continue;
        }
        let mut road = Road::new(nplanes);
        if !road.add(seed, &matches[seed]) {
            continue;
        }
        for (j, m) in matches.iter().enumerate().skip(seed + 1) {
            let Some(&first) = m.bins.first() else {
                continue;
            };
            if first > road.right[0].saturating_add(pattern_max_dist) {
                break;
            }
            if m.usage != Usage::FullyUsed {
                road.add(j, m);
            }
        }
        road.finish(matches);
        roads.push(road);
    }
    debug!("{} roads from {} matches", roads.len(), matches.len());
    roads
}
