//! Per-event bin bitmap matched against the pattern tree.
//!
//! For every layer the hitpattern holds one bit per bin of every tree level,
//! bit `2^depth + bin`. Hits are recorded at the finest level; setting a
//! finest bin also sets all coarser bins that contain it, so a tree node can
//! be tested at its own resolution with a single lookup. The hit lists of
//! the finest bins resolve matches back to hits.

use crate::config::MAX_DEPTH;
use crate::hit::{HitId, HitSet, LayerHits, PlaneHits};
use crate::pairs::HitPairIter;
use log::debug;
use std::collections::HashMap;

/// Multi-level bin bitmap of one event.
#[derive(Debug, Clone)]
pub struct Hitpattern {
    nlevels: u32,
    origin: f64,
    /// Finest bins per unit length.
    scale: f64,
    bits: Vec<Vec<u64>>,
    hits: Vec<HashMap<u32, Vec<HitId>>>,
}

impl Hitpattern {
    /// Creates an empty hitpattern for `nlayers` layers covering
    /// `[origin, origin + width)` at `nlevels` levels.
    ///
    /// # Panics
    ///
    /// Panics if `nlevels` exceeds the deepest tree or `width` is not positive.
    pub fn new(nlevels: u32, nlayers: usize, origin: f64, width: f64) -> Self {
        assert!((1..=MAX_DEPTH + 1).contains(&nlevels), "unsupported level count {}", nlevels);
        assert!(width > 0.0, "hitpattern width must be positive");
        let nbits = 1usize << nlevels;
        let words = nbits.div_ceil(64);
        Self {
            nlevels,
            origin,
            scale: (1u64 << (nlevels - 1)) as f64 / width,
            bits: vec![vec![0; words]; nlayers],
            hits: vec![HashMap::new(); nlayers],
        }
    }

    /// Number of levels.
    pub fn nlevels(&self) -> u32 {
        self.nlevels
    }

    /// Number of layers.
    pub fn nlayers(&self) -> usize {
        self.bits.len()
    }

    /// Number of bins at the finest level.
    pub fn nbins(&self) -> u32 {
        1 << (self.nlevels - 1)
    }

    /// Clears all bins and hit lists.
    pub fn clear(&mut self) {
        for words in &mut self.bits {
            words.fill(0);
        }
        for lists in &mut self.hits {
            lists.clear();
        }
    }

    /// Tests bin `bin` of `layer` at level `depth`.
    #[inline]
    pub fn is_set(&self, layer: usize, depth: u32, bin: u32) -> bool {
        if depth >= self.nlevels || u64::from(bin) >= 1u64 << depth {
            return false;
        }
        let idx = (1usize << depth) + bin as usize;
        self.bits[layer][idx / 64] & (1u64 << (idx % 64)) != 0
    }

    /// Hits recorded in finest bin `bin` of `layer`.
    pub fn hits_in(&self, layer: usize, bin: u32) -> &[HitId] {
        self.hits[layer].get(&bin).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Adds the hits of finest bin `bin` of `layer` to `out`.
    pub fn collect_hits(&self, layer: usize, bin: u32, out: &mut HitSet) {
        out.extend(self.hits_in(layer, bin).iter().copied());
    }

    /// Sets finest bin `bin` of `layer` and all bins containing it.
    pub fn set_bin(&mut self, layer: usize, bin: u32) {
        let last = self.nlevels - 1;
        let words = &mut self.bits[layer];
        for depth in (0..=last).rev() {
            let idx = (1usize << depth) + (bin >> (last - depth)) as usize;
            let mask = 1u64 << (idx % 64);
            if words[idx / 64] & mask != 0 {
                // ancestors of a set bin are set
                break;
            }
            words[idx / 64] |= mask;
        }
    }

    /// Finest bin containing position `x`, clamped to the tracking region.
    ///
    /// Returns `None` for positions outside the region.
    fn bin_of(&self, x: f64) -> Option<u32> {
        let b = ((x - self.origin) * self.scale).floor();
        if b.is_nan() || b < 0.0 || b >= f64::from(self.nbins()) {
            None
        } else {
            Some(b as u32)
        }
    }

    /// Records a hit in all finest bins covering `[lo, hi]`.
    fn set_range(&mut self, layer: usize, lo: f64, hi: f64, id: HitId) {
        let last = self.nbins() - 1;
        let lo_bin = match self.bin_of(lo) {
            Some(b) => b,
            None if lo < self.origin => 0,
            None => return,
        };
        let hi_bin = match self.bin_of(hi) {
            Some(b) => b,
            None if hi >= self.origin => last,
            None => return,
        };
        for bin in lo_bin..=hi_bin {
            self.set_bin(layer, bin);
            let list = self.hits[layer].entry(bin).or_default();
            if !list.contains(&id) {
                list.push(id);
            }
        }
    }

    /// Records hit `index` of `plane` in `layer`.
    ///
    /// Both drift solutions are entered, each widened by the hit resolution.
    pub fn add_hit(&mut self, layer: usize, plane: &PlaneHits, index: usize) {
        let hit = &plane.hits()[index];
        let id = plane.id(index);
        let (pos_l, pos_r, res) = (hit.pos_l, hit.pos_r, hit.resolution);
        self.set_range(layer, pos_l - res, pos_l + res, id);
        self.set_range(layer, pos_r - res, pos_r + res, id);
    }

    /// Records the hits of one layer. Returns the number of hits recorded.
    ///
    /// Hits of partner planes are merged with `HitPairIter`; with
    /// `pairs_only` hits without partner are dropped.
    pub fn fill_layer(
        &mut self,
        layer: usize,
        hits: &LayerHits,
        pair_max_dist: f64,
        pairs_only: bool,
    ) -> usize {
        let first = &hits.first;
        let Some(second) = hits.second.as_ref() else {
            for i in 0..first.len() {
                self.add_hit(layer, first, i);
            }
            return first.len();
        };

        let mut seen = HitSet::new();
        for pair in HitPairIter::new(first.hits(), second.hits(), pair_max_dist) {
            let single = pair.0.is_none() || pair.1.is_none();
            if single && pairs_only {
                continue;
            }
            if let Some(i) = pair.0 {
                if seen.insert(first.id(i)) {
                    self.add_hit(layer, first, i);
                }
            }
            if let Some(j) = pair.1 {
                if seen.insert(second.id(j)) {
                    self.add_hit(layer, second, j);
                }
            }
        }
        debug!(
            "layer {}: {} of {} hits from planes {}/{}",
            layer,
            seen.len(),
            first.len() + second.len(),
            first.plane(),
            second.plane()
        );
        seen.len()
    }
}

/// Allowed combinations of layers with hits.
///
/// Indexed by a mask with bit `i` set if layer `i` has a hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerCombos {
    nlayers: usize,
    allowed: Vec<bool>,
}

impl LayerCombos {
    /// Allows every combination missing at most `max_missing` layers.
    ///
    /// # Panics
    ///
    /// Panics if `nlayers` exceeds 16.
    pub fn with_max_missing(nlayers: usize, max_missing: u32) -> Self {
        assert!(nlayers <= 16, "too many layers for combination masks");
        let allowed = (0..1u32 << nlayers)
            .map(|mask| nlayers as u32 - mask.count_ones() <= max_missing)
            .collect();
        Self { nlayers, allowed }
    }

    /// Number of layers.
    pub fn nlayers(&self) -> usize {
        self.nlayers
    }

    /// Whether a node with hits in the layers of `mask` may match.
    #[inline]
    pub fn allows(&self, mask: u32) -> bool {
        self.allowed.get(mask as usize).copied().unwrap_or(false)
    }

    /// Permits or forbids one combination.
    pub fn set(&mut self, mask: u32, allowed: bool) {
        if let Some(slot) = self.allowed.get_mut(mask as usize) {
            *slot = allowed;
        }
    }
}
