//! Merge-join of the hits of two partner planes.
//!
//! `HitPairIter` walks two sorted hit lists in lock step and yields index
//! pairs. Both sides are set when the hits overlap within the pairing
//! distance; one side is set for a hit without partner. A hit of the first
//! plane that overlaps several consecutive hits of the second plane is held
//! while the cluster is scanned, producing one pair per overlapping hit.
//! When the cluster ends, the second plane is rewound to the cluster start,
//! since hits paired with the old hit may also pair with the next one.

use crate::hit::Hit;
use std::cmp::Ordering;
use std::iter::FusedIterator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Plain merge-join.
    Normal,
    /// Current A hit overlaps a run of B hits starting at `start`.
    Scanning { start: usize },
}

/// Iterator over corresponding hits of two sorted hit lists.
///
/// Yields `(index into a, index into b)`; `None` marks a missing partner.
///
/// A B hit of a finished cluster that is not left of the next A hit but
/// does not overlap it either is revisited after the rewind. Such a hit can
/// be yielded once more as unpaired even though it was paired before. This
/// needs hits widened by drift distance and a pairing distance wider than
/// the gap between consecutive A hits; callers counting unpaired hits should
/// deduplicate by index.
#[derive(Debug, Clone)]
pub struct HitPairIter<'a> {
    a: &'a [Hit],
    b: &'a [Hit],
    max_dist: f64,
    ia: usize,
    ib: usize,
    state: ScanState,
}

impl<'a> HitPairIter<'a> {
    /// Creates an iterator over `a` and `b`, both sorted by `Hit::cmp_total`.
    pub fn new(a: &'a [Hit], b: &'a [Hit], max_dist: f64) -> Self {
        Self {
            a,
            b,
            max_dist,
            ia: 0,
            ib: 0,
            state: ScanState::Normal,
        }
    }

    /// Restarts the iteration from the first hits.
    pub fn reset(&mut self) {
        self.ia = 0;
        self.ib = 0;
        self.state = ScanState::Normal;
    }

    /// Advances past a matched pair `(ia, ib)`.
    fn after_match(&mut self, hit_a: &Hit) {
        let next_b = self.ib + 1;
        let cluster_continues = self
            .b
            .get(next_b)
            .is_some_and(|hb| hit_a.compare_within(hb, self.max_dist) == Ordering::Equal);

        match (self.state, cluster_continues) {
            (ScanState::Normal, true) => {
                self.state = ScanState::Scanning { start: self.ib };
                self.ib = next_b;
            }
            (ScanState::Scanning { .. }, true) => self.ib = next_b,
            (ScanState::Normal, false) => {
                self.ia += 1;
                self.ib = next_b;
            }
            (ScanState::Scanning { start }, false) => {
                self.state = ScanState::Normal;
                self.ia += 1;
                // B hits of the finished cluster left of the new A hit are
                // already paired and must not show up as unpaired
                self.ib = match self.a.get(self.ia) {
                    Some(new_a) => {
                        let mut jb = start;
                        while jb != next_b
                            && self.b[jb].compare_within(new_a, self.max_dist) == Ordering::Less
                        {
                            jb += 1;
                        }
                        jb
                    }
                    None => next_b,
                };
            }
        }
    }
}

impl Iterator for HitPairIter<'_> {
    type Item = (Option<usize>, Option<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        let (ia, ib) = (self.ia, self.ib);
        match (self.a.get(ia), self.b.get(ib)) {
            (None, None) => None,
            (Some(_), None) => {
                self.ia += 1;
                Some((Some(ia), None))
            }
            (None, Some(_)) => {
                self.ib += 1;
                Some((None, Some(ib)))
            }
            (Some(hit_a), Some(hit_b)) => match hit_a.compare_within(hit_b, self.max_dist) {
                Ordering::Less => {
                    self.ia += 1;
                    Some((Some(ia), None))
                }
                Ordering::Greater => {
                    self.ib += 1;
                    Some((None, Some(ib)))
                }
                Ordering::Equal => {
                    self.after_match(hit_a);
                    Some((Some(ia), Some(ib)))
                }
            },
        }
    }
}

impl FusedIterator for HitPairIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::PlaneType;

    fn hits(plane: u16, positions: &[f64]) -> Vec<Hit> {
        positions
            .iter()
            .enumerate()
            .map(|(i, &x)| Hit::new(PlaneType::V, plane, i as i32, x, 0.0, 0.01))
            .collect()
    }

    fn pairs(a: &[f64], b: &[f64], max_dist: f64) -> Vec<(Option<usize>, Option<usize>)> {
        let (a, b) = (hits(0, a), hits(1, b));
        HitPairIter::new(&a, &b, max_dist).collect()
    }

    #[test]
    fn one_hit_overlapping_two() {
        assert_eq!(
            pairs(&[10.0], &[10.4, 10.6], 0.5),
            vec![(Some(0), Some(0)), (Some(0), Some(1))]
        );
    }

    #[test]
    fn no_overlap_gives_singles_in_order() {
        assert_eq!(
            pairs(&[0.0], &[100.0], 1.0),
            vec![(Some(0), None), (None, Some(0))]
        );
    }

    #[test]
    fn cluster_members_pair_with_the_next_hit() {
        assert_eq!(
            pairs(&[10.0, 10.3], &[10.1, 10.2, 11.0], 0.25),
            vec![
                (Some(0), Some(0)),
                (Some(0), Some(1)),
                (Some(1), Some(0)),
                (Some(1), Some(1)),
                (None, Some(2)),
            ]
        );
    }

    #[test]
    fn consumed_cluster_is_not_reported_unpaired() {
        assert_eq!(
            pairs(&[10.0, 12.0], &[10.2, 10.4, 12.1], 0.25),
            vec![(Some(0), Some(0)), (Some(0), Some(1)), (Some(1), Some(2))]
        );
    }

    #[test]
    fn overlapping_clusters() {
        assert_eq!(
            pairs(&[10.0, 10.8], &[10.4, 10.6, 11.5], 0.5),
            vec![
                (Some(0), Some(0)),
                (Some(0), Some(1)),
                (Some(1), Some(0)),
                (Some(1), Some(1)),
                (Some(1), Some(2)),
            ]
        );
    }

    #[test]
    fn one_side_empty() {
        assert_eq!(pairs(&[], &[1.0, 2.0], 0.1), vec![(None, Some(0)), (None, Some(1))]);
        assert_eq!(pairs(&[1.0], &[], 0.1), vec![(Some(0), None)]);
        assert!(pairs(&[], &[], 0.1).is_empty());
    }

    #[test]
    fn every_hit_appears() {
        let a = [0.0, 1.0, 1.05, 3.0, 7.0, 7.1];
        let b = [0.1, 0.9, 1.1, 1.2, 5.0, 7.05];
        let result = pairs(&a, &b, 0.1);
        for i in 0..a.len() {
            assert!(result.iter().any(|p| p.0 == Some(i)), "a[{}] missing", i);
        }
        for j in 0..b.len() {
            assert!(result.iter().any(|p| p.1 == Some(j)), "b[{}] missing", j);
        }
    }

    #[test]
    fn reset_restarts() {
        let (a, b) = (hits(0, &[10.0, 10.3]), hits(1, &[10.1, 10.2, 11.0]));
        let mut it = HitPairIter::new(&a, &b, 0.25);
        let first: Vec<_> = it.by_ref().collect();
        assert_eq!(it.next(), None);
        it.reset();
        let second: Vec<_> = it.collect();
        assert_eq!(first, second);
    }
}
