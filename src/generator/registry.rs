//! Hash-bucket registry mapping canonical patterns to build nodes.

use crate::arena::{NodeArena, PatternId};
use crate::pattern::Pattern;

/// Buckets of node handles keyed by `Pattern::bucket_hash`.
///
/// The registry stores handles only; patterns are compared through the arena
/// that owns them.
#[derive(Debug, Clone)]
pub(crate) struct Registry {
    buckets: Vec<Vec<PatternId>>,
    mask: u32,
}

impl Registry {
    /// Creates a registry with `2^bits` buckets.
    pub(crate) fn new(bits: u32) -> Self {
        let size = 1usize << bits;
        Self {
            buckets: vec![Vec::new(); size],
            mask: (size - 1) as u32,
        }
    }

    #[inline]
    fn bucket(&self, pattern: &Pattern) -> usize {
        (pattern.bucket_hash() & self.mask) as usize
    }

    /// Looks up the node holding `pattern`.
    pub(crate) fn find<T, F>(&self, nodes: &NodeArena<T>, pattern: &Pattern, key: F) -> Option<PatternId>
    where
        F: Fn(&T) -> &Pattern,
    {
        self.buckets[self.bucket(pattern)]
            .iter()
            .copied()
            .find(|&id| key(&nodes[id]) == pattern)
    }

    /// Registers `id` as the node holding `pattern`.
    ///
    /// The caller guarantees the pattern is not registered yet.
    pub(crate) fn insert(&mut self, pattern: &Pattern, id: PatternId) {
        let b = self.bucket(pattern);
        self.buckets[b].push(id);
    }

    /// Number of buckets.
    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Longest bucket chain.
    pub(crate) fn max_chain_length(&self) -> usize {
        self.buckets.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Heap bytes held by the buckets.
    pub(crate) fn heap_bytes(&self) -> usize {
        self.buckets.len() * std::mem::size_of::<Vec<PatternId>>()
            + self
                .buckets
                .iter()
                .map(|b| b.capacity() * std::mem::size_of::<PatternId>())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_registered_patterns_only() {
        let mut nodes: NodeArena<Pattern> = NodeArena::new();
        let mut reg = Registry::new(2);
        assert_eq!(reg.len(), 4);

        for bits in [vec![0, 0, 0], vec![0, 1, 1], vec![0, 1, 2], vec![0, 2, 3], vec![0, 0, 1]] {
            let p = Pattern::from_bits(bits);
            let id = nodes.allocate(p.clone());
            reg.insert(&p, id);
        }
        for id in (0..nodes.len() as u32).map(PatternId::new) {
            assert_eq!(reg.find(&nodes, &nodes[id], |p| p), Some(id));
        }
        assert_eq!(reg.find(&nodes, &Pattern::from_bits(vec![0, 3, 3]), |p| p), None);
        // five entries in four buckets
        assert!(reg.max_chain_length() >= 2);
    }
}
