//! Hits supplied by the detector decoding stage.
//!
//! Hits are read-only inputs. The matcher and road builder refer to them by
//! `HitId` (plane number plus index into that plane's sorted hit list), so
//! hit sets are plain ordered sets of small copyable keys.

use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Wire orientation of a plane. Hits of different types are never compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlaneType {
    U,
    V,
    X,
    Y,
}

/// Stable reference to a hit of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HitId {
    /// Plane number within the projection.
    pub plane: u16,
    /// Index into the plane's sorted hit list.
    pub index: u32,
}

impl HitId {
    /// Creates a new hit id.
    pub const fn new(plane: u16, index: u32) -> Self {
        Self { plane, index }
    }
}

/// Ordered set of hits.
pub type HitSet = BTreeSet<HitId>;

/// A single wire hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Orientation of the plane that recorded the hit.
    pub plane_type: PlaneType,
    /// Plane number within the projection.
    pub plane: u16,
    /// Wire number.
    pub wire: i32,
    /// Wire position.
    pub pos: f64,
    /// Position of the left drift solution.
    pub pos_l: f64,
    /// Position of the right drift solution.
    pub pos_r: f64,
    /// Drift time.
    pub time: f64,
    /// Position resolution.
    pub resolution: f64,
}

impl Hit {
    /// Creates a hit without drift distance.
    pub fn new(
        plane_type: PlaneType,
        plane: u16,
        wire: i32,
        pos: f64,
        time: f64,
        resolution: f64,
    ) -> Self {
        Self {
            plane_type,
            plane,
            wire,
            pos,
            pos_l: pos,
            pos_r: pos,
            time,
            resolution,
        }
    }

    /// Sets the left/right positions to `pos ∓ drift`.
    pub fn with_drift(mut self, drift: f64) -> Self {
        self.pos_l = self.pos - drift;
        self.pos_r = self.pos + drift;
        self
    }

    /// Drift distance.
    pub fn drift_distance(&self) -> f64 {
        self.pos_r - self.pos
    }

    /// Compares positions with tolerance.
    ///
    /// Each hit covers `[pos_l - max_dist, pos_r + max_dist]`. Overlapping
    /// hits compare `Equal`; otherwise the hit further left is `Less`.
    ///
    /// # Panics
    ///
    /// Panics if the hits belong to planes of different types.
    pub fn compare_within(&self, other: &Hit, max_dist: f64) -> Ordering {
        assert_eq!(
            self.plane_type, other.plane_type,
            "comparing hits of different plane types"
        );
        if self.pos_r + max_dist < other.pos_l - max_dist {
            Ordering::Less
        } else if other.pos_r + max_dist < self.pos_l - max_dist {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }

    /// Total order: plane type, plane, position, then time.
    ///
    /// Hits on the same wire are ordered by arrival.
    pub fn cmp_total(&self, other: &Hit) -> Ordering {
        self.plane_type
            .cmp(&other.plane_type)
            .then(self.plane.cmp(&other.plane))
            .then(self.pos.total_cmp(&other.pos))
            .then(self.time.total_cmp(&other.time))
    }
}

/// Hits of one plane, kept in `Hit::cmp_total` order.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneHits {
    plane_type: PlaneType,
    plane: u16,
    hits: Vec<Hit>,
}

impl PlaneHits {
    /// Creates an empty plane.
    pub fn new(plane_type: PlaneType, plane: u16) -> Self {
        Self {
            plane_type,
            plane,
            hits: Vec::new(),
        }
    }

    /// Creates a plane from unsorted hits.
    ///
    /// # Panics
    ///
    /// Panics if a hit belongs to another plane.
    pub fn from_hits(plane_type: PlaneType, plane: u16, hits: Vec<Hit>) -> Self {
        let mut p = Self::new(plane_type, plane);
        for hit in hits {
            p.push(hit);
        }
        p
    }

    /// Inserts a hit at its sorted position.
    ///
    /// # Panics
    ///
    /// Panics if the hit belongs to another plane.
    pub fn push(&mut self, hit: Hit) {
        assert!(
            hit.plane == self.plane && hit.plane_type == self.plane_type,
            "hit of plane {} added to plane {}",
            hit.plane,
            self.plane
        );
        let at = self
            .hits
            .partition_point(|h| h.cmp_total(&hit) != Ordering::Greater);
        self.hits.insert(at, hit);
    }

    /// Plane number.
    pub fn plane(&self) -> u16 {
        self.plane
    }

    /// Plane orientation.
    pub fn plane_type(&self) -> PlaneType {
        self.plane_type
    }

    /// Sorted hits.
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    /// Id of the hit at `index`.
    pub fn id(&self, index: usize) -> HitId {
        HitId::new(self.plane, index as u32)
    }

    /// Number of hits.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Whether the plane has no hits.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Removes all hits.
    pub fn clear(&mut self) {
        self.hits.clear();
    }
}

/// Hits of one tracking layer: a single plane or a pair of partner planes.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerHits {
    /// First (or only) plane.
    pub first: PlaneHits,
    /// Partner plane of a paired layer.
    pub second: Option<PlaneHits>,
}

impl LayerHits {
    /// A layer made of one plane.
    pub fn single(plane: PlaneHits) -> Self {
        Self {
            first: plane,
            second: None,
        }
    }

    /// A layer made of two partner planes.
    ///
    /// # Panics
    ///
    /// Panics if the planes have different types.
    pub fn paired(first: PlaneHits, second: PlaneHits) -> Self {
        assert_eq!(first.plane_type(), second.plane_type(), "partner planes differ in type");
        Self {
            first,
            second: Some(second),
        }
    }

    /// Number of planes in the layer.
    pub fn nplanes(&self) -> usize {
        1 + usize::from(self.second.is_some())
    }

    /// Planes of the layer.
    pub fn planes(&self) -> impl Iterator<Item = &PlaneHits> {
        std::iter::once(&self.first).chain(self.second.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(plane: u16, pos: f64, time: f64) -> Hit {
        Hit::new(PlaneType::X, plane, (pos * 10.0) as i32, pos, time, 0.01)
    }

    #[test]
    fn compare_within_tolerance() {
        let a = hit(0, 10.0, 0.0);
        assert_eq!(a.compare_within(&hit(0, 10.9, 0.0), 0.5), Ordering::Equal);
        assert_eq!(a.compare_within(&hit(0, 11.1, 0.0), 0.5), Ordering::Less);
        assert_eq!(a.compare_within(&hit(0, 8.9, 0.0), 0.5), Ordering::Greater);
        assert_eq!(a.compare_within(&hit(0, 10.0, 5.0), 0.0), Ordering::Equal);
    }

    #[test]
    fn drift_widens_the_hit() {
        let a = hit(0, 10.0, 0.0).with_drift(0.6);
        assert!((a.drift_distance() - 0.6).abs() < 1e-12);
        assert_eq!(a.compare_within(&hit(0, 10.5, 0.0), 0.0), Ordering::Equal);
        assert_eq!(hit(0, 10.0, 0.0).compare_within(&hit(0, 10.5, 0.0), 0.0), Ordering::Less);
    }

    #[test]
    #[should_panic(expected = "different plane types")]
    fn mismatched_plane_types_panic() {
        let a = hit(0, 1.0, 0.0);
        let mut b = hit(0, 1.0, 0.0);
        b.plane_type = PlaneType::U;
        a.compare_within(&b, 0.1);
    }

    #[test]
    fn total_order_breaks_ties_by_time() {
        let early = hit(0, 1.0, 10.0);
        let late = hit(0, 1.0, 20.0);
        assert_eq!(early.cmp_total(&late), Ordering::Less);
        assert_eq!(hit(1, 0.0, 0.0).cmp_total(&hit(0, 5.0, 0.0)), Ordering::Greater);
    }

    #[test]
    fn plane_keeps_hits_sorted() {
        let p = PlaneHits::from_hits(
            PlaneType::X,
            0,
            vec![hit(0, 3.0, 0.0), hit(0, 1.0, 5.0), hit(0, 1.0, 2.0), hit(0, 2.0, 0.0)],
        );
        let order: Vec<(f64, f64)> = p.hits().iter().map(|h| (h.pos, h.time)).collect();
        assert_eq!(order, vec![(1.0, 2.0), (1.0, 5.0), (2.0, 0.0), (3.0, 0.0)]);
        assert_eq!(p.id(2), HitId::new(0, 2));
    }

    #[test]
    fn layer_planes() {
        let a = PlaneHits::new(PlaneType::X, 0);
        let b = PlaneHits::new(PlaneType::X, 1);
        assert_eq!(LayerHits::single(a.clone()).nplanes(), 1);
        let pair = LayerHits::paired(a, b);
        assert_eq!(pair.nplanes(), 2);
        assert_eq!(pair.planes().map(PlaneHits::plane).collect::<Vec<_>>(), vec![0, 1]);
    }
}
