//! Geometric acceptance tests for candidate patterns.

use crate::config::NormalizedParams;
use crate::pattern::Pattern;

/// Relative tolerance of the line-consistency test.
///
/// A deviation within this fraction of one bin width from the band edge
/// counts as outside the band, so boundary cases do not depend on how the
/// layer positions happen to round.
pub const LINE_TOLERANCE: f64 = 1e-9;

/// Slope and straight-line tests for one detector geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct LineGeometry {
    z: Vec<f64>,
    max_slope: f64,
}

impl LineGeometry {
    /// Creates the tests for normalized parameters.
    pub fn new(params: &NormalizedParams) -> Self {
        Self {
            z: params.z.clone(),
            max_slope: params.max_slope,
        }
    }

    /// Normalized layer positions.
    pub fn z(&self) -> &[f64] {
        &self.z
    }

    /// Tests the slope of `pattern` at tree level `depth`.
    ///
    /// Bins have finite size, so a pattern of width `w` is compatible with
    /// slopes down to `(w-1) / 2^depth`. The test only gets looser with
    /// increasing depth.
    pub fn slope_ok(&self, pattern: &Pattern, depth: u32) -> bool {
        let width = pattern.width();
        width < 2 || f64::from(width - 1) / f64::from(1u32 << depth) <= self.max_slope
    }

    /// Tests whether the bins of `pattern` are compatible with a straight line.
    ///
    /// Assumes a canonical pattern (`pattern[0] == 0`) and identical bin sizes
    /// and positions in every layer. Walking from the last layer inwards, every
    /// intermediate bin must lie within one bin width of the band spanned by
    /// the lines through the outer bins; the band is narrowed as inner bins
    /// constrain it.
    pub fn line_ok(&self, pattern: &Pattern) -> bool {
        let n = self.z.len();
        debug_assert_eq!(pattern.nlayers(), n);
        let last = n - 1;
        let mut x_l = f64::from(pattern[last]);
        let mut x_rm1 = x_l;
        let mut z_l = self.z[last];
        let mut z_r = z_l;

        for i in (1..last).rev() {
            let p = f64::from(pattern[i]);
            // Distance of the band edges from the bin edge at layer i, scaled
            // by the edge's end point to avoid a division (x0 = 0).
            let d_l = x_l * self.z[i] - p * z_l;
            if outside_band(d_l, z_l) {
                return false;
            }
            let d_r = x_rm1 * self.z[i] - p * z_r;
            if outside_band(d_r, z_r) {
                return false;
            }
            if i > 1 {
                if d_l > 0.0 {
                    x_rm1 = p;
                    z_r = self.z[i];
                }
                if d_r < 0.0 {
                    x_l = p;
                    z_l = self.z[i];
                }
            }
        }
        true
    }
}

#[inline]
fn outside_band(d: f64, scale: f64) -> bool {
    d.abs() >= scale * (1.0 - LINE_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeParams;

    fn geometry(z: Vec<f64>, max_slope: f64) -> LineGeometry {
        let width = z[z.len() - 1] - z[0];
        let params = TreeParams::new(4, width, z, max_slope);
        LineGeometry::new(&params.normalize().unwrap())
    }

    fn pat(bits: &[u16]) -> Pattern {
        Pattern::from_bits(bits.to_vec())
    }

    #[test]
    fn straight_patterns_pass() {
        let g = geometry(vec![0.0, 1.0, 2.0], 1.0);
        assert!(g.line_ok(&pat(&[0, 0, 0])));
        assert!(g.line_ok(&pat(&[0, 1, 2])));
        assert!(g.line_ok(&pat(&[0, 1, 3])));
        assert!(g.line_ok(&pat(&[0, 2, 3])));
    }

    #[test]
    fn kinked_patterns_fail() {
        let g = geometry(vec![0.0, 1.0, 2.0], 1.0);
        // middle bin one full bin off the band
        assert!(!g.line_ok(&pat(&[0, 2, 2])));
        assert!(!g.line_ok(&pat(&[0, 0, 2])));
        assert!(!g.line_ok(&pat(&[0, 3, 3])));
    }

    #[test]
    fn inner_layers_narrow_the_band() {
        let g = geometry(vec![0.0, 1.0, 2.0, 3.0], 1.0);
        assert!(g.line_ok(&pat(&[0, 1, 2, 3])));
        assert!(g.line_ok(&pat(&[0, 1, 1, 2])));
        assert!(!g.line_ok(&pat(&[0, 2, 1, 3])));
    }

    #[test]
    fn rounding_does_not_move_the_band_edge() {
        // 0.1/0.3 is not representable; the exact band edge sits on bin 2
        let exact = geometry(vec![0.0, 1.0, 3.0], 1.0);
        let rounded = geometry(vec![0.0, 0.1, 0.3], 1.0);
        let edge = pat(&[0, 2, 3]);
        assert!(!exact.line_ok(&edge));
        assert_eq!(exact.line_ok(&edge), rounded.line_ok(&edge));
        let inside = pat(&[0, 1, 3]);
        assert!(exact.line_ok(&inside));
        assert!(rounded.line_ok(&inside));
    }

    #[test]
    fn nearly_coincident_layers() {
        // Layer 1 almost on top of layer 0: it must share bin 0 with it.
        let g = geometry(vec![0.0, 1e-12, 1.0], 1.0);
        assert!(g.line_ok(&pat(&[0, 0, 1])));
        assert!(!g.line_ok(&pat(&[0, 1, 1])));
        // Almost on top of the last layer: it must follow the last bin.
        let g = geometry(vec![0.0, 1.0 - 1e-12, 1.0], 1.0);
        assert!(g.line_ok(&pat(&[0, 1, 1])));
        assert!(!g.line_ok(&pat(&[0, 0, 1])));
    }

    #[test]
    fn slope_test_loosens_with_depth() {
        let g = geometry(vec![0.0, 1.0, 2.0], 0.5);
        let p = pat(&[0, 2, 3]);
        assert!(!g.slope_ok(&p, 0));
        assert!(!g.slope_ok(&p, 1));
        assert!(g.slope_ok(&p, 2));
        for depth in 2..10 {
            assert!(g.slope_ok(&p, depth));
        }
        // narrow patterns always pass
        assert!(g.slope_ok(&pat(&[0, 0, 1]), 0));
    }

    #[test]
    fn slope_rejection_is_monotonic() {
        let g = geometry(vec![0.0, 1.0, 2.0, 4.0], 0.3);
        for w in 0..40u16 {
            let p = pat(&[0, w / 2, w / 2, w]);
            for depth in 1..12 {
                if !g.slope_ok(&p, depth) {
                    for shallower in 0..depth {
                        assert!(!g.slope_ok(&p, shallower), "w={} depth={}", w, shallower);
                    }
                } else {
                    for deeper in depth..14 {
                        assert!(g.slope_ok(&p, deeper), "w={} depth={}", w, deeper);
                    }
                }
            }
        }
    }
}
