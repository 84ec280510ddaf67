//! Enumeration of the child patterns of a parent pattern.

use crate::pattern::{Bin, LinkType, Pattern};

/// Iterator over the canonical child patterns of a parent pattern that occur
/// when the bin resolution is doubled.
///
/// Each child bin is either `2*p` or `2*p + 1` of the parent bin `p`, giving
/// `2^nlayers` raw combinations, enumerated from the all-ones choice down to
/// the all-zeros choice. Raw children whose span exceeds the distance between
/// the outer layers are skipped; the others are normalized to canonical form
/// and yielded with the transform that recovers the raw child:
///
/// - `Shifted` if the raw child had to be moved one bin to the left,
/// - `Mirrored` if the raw child runs towards smaller bins.
///
/// To recover a raw child from its canonical form, mirror first, then shift.
/// Mirrored children only come from the all-zero root, which never yields a
/// shifted child at the same time.
pub(crate) struct ChildIter<'a> {
    parent: &'a Pattern,
    /// Trial combinations left to enumerate.
    remaining: u32,
    raw: Vec<i32>,
}

impl<'a> ChildIter<'a> {
    pub(crate) fn new(parent: &'a Pattern) -> Self {
        let n = parent.nlayers();
        Self {
            parent,
            remaining: 1u32 << n,
            raw: vec![0; n],
        }
    }
}

impl Iterator for ChildIter<'_> {
    type Item = (Pattern, LinkType);

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.parent.nlayers();
        while self.remaining > 0 {
            self.remaining -= 1;
            let choice = self.remaining;

            let mut minbit = i32::MAX;
            let mut maxbit = i32::MIN;
            for (i, slot) in self.raw.iter_mut().enumerate() {
                let bit = (i32::from(self.parent[i]) << 1) | ((choice >> i) & 1) as i32;
                *slot = bit;
                minbit = minbit.min(bit);
                maxbit = maxbit.max(bit);
            }
            let mut width = self.raw[n - 1] - self.raw[0];
            if maxbit - minbit > width.abs() {
                continue;
            }

            let mut kind = LinkType::Plain;
            if minbit != 0 {
                kind = LinkType::Shifted;
                for v in self.raw.iter_mut() {
                    *v -= minbit;
                }
            }
            if width < 0 {
                debug_assert_eq!(kind, LinkType::Plain, "shifted and mirrored child");
                kind = LinkType::Mirrored;
                width = -width;
                for v in self.raw.iter_mut() {
                    *v = width - *v;
                }
            }
            let bits = self.raw.iter().map(|&v| v as Bin).collect();
            return Some((Pattern::from_bits(bits), kind));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn children(parent: &[Bin]) -> Vec<(Vec<Bin>, LinkType)> {
        let parent = Pattern::from_bits(parent.to_vec());
        ChildIter::new(&parent)
            .map(|(p, k)| (p.bits().to_vec(), k))
            .collect()
    }

    #[test]
    fn root_children_of_three_layers() {
        use LinkType::*;
        assert_eq!(
            children(&[0, 0, 0]),
            vec![
                (vec![0, 0, 0], Shifted),
                (vec![0, 1, 1], Plain),
                (vec![0, 0, 1], Plain),
                (vec![0, 0, 1], Mirrored),
                (vec![0, 1, 1], Mirrored),
                (vec![0, 0, 0], Plain),
            ]
        );
    }

    #[test]
    fn children_of_non_root_are_never_mirrored() {
        let kids = children(&[0, 1, 1]);
        assert_eq!(kids.len(), 6);
        for (bits, kind) in &kids {
            assert_ne!(*kind, LinkType::Mirrored);
            assert_eq!(bits[0], 0);
            assert!(bits.iter().all(|&b| b <= bits[2]));
        }
        assert!(kids.contains(&(vec![0, 1, 2], LinkType::Shifted)));
        assert!(kids.contains(&(vec![0, 1, 1], LinkType::Shifted)));
        assert!(!kids.iter().any(|(b, _)| b == &vec![0, 3, 2]));
    }

    #[test]
    fn two_layer_root() {
        use LinkType::*;
        assert_eq!(
            children(&[0, 0]),
            vec![
                (vec![0, 0], Shifted),
                (vec![0, 1], Plain),
                (vec![0, 1], Mirrored),
                (vec![0, 0], Plain),
            ]
        );
    }
}
