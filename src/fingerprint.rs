//! Deterministic fingerprints for tree parameters and built trees.
//!
//! A persisted tree is only valid for the geometry it was generated from, so
//! the file header carries a fingerprint of the parameters and readers compare
//! it against the parameters they expect. Fingerprints are SHA-256 over
//! canonical bytes with domain separation and length prefixing, so identical
//! inputs give identical fingerprints across builds and hosts.
//!
//! # Citations
//! - SHA-256: NIST FIPS 180-4 (2015)

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 256-bit hash value.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashValue(pub [u8; 32]);

impl HashValue {
    /// Creates a zero hash (all zeros).
    #[inline]
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Creates a hash from a raw byte array.
    #[inline]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw byte array.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes SHA-256 of the given data with domain separation.
    ///
    /// The hashed message is `b"TS:<domain>:v1" || len(data) as u64 BE || data`.
    pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"TS:");
        hasher.update(domain);
        hasher.update(b":v1");
        hasher.update((data.len() as u64).to_be_bytes());
        hasher.update(data);
        Self(hasher.finalize().into())
    }
}

impl std::fmt::Display for HashValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 4 bytes are enough to tell trees apart in logs
        write!(
            f,
            "HashValue({:02x}{:02x}{:02x}{:02x}…)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Types with a canonical byte encoding suitable for fingerprinting.
pub trait Canonicalizable {
    /// Returns deterministic canonical bytes.
    fn to_canonical_bytes(&self) -> Vec<u8>;

    /// Domain tag separating fingerprints of different types.
    fn fingerprint_domain(&self) -> &'static [u8];

    /// Fingerprint of the canonical bytes.
    fn fingerprint(&self) -> HashValue {
        HashValue::hash_with_domain(self.fingerprint_domain(), &self.to_canonical_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_separates_equal_payloads() {
        let a = HashValue::hash_with_domain(b"A", b"payload");
        let b = HashValue::hash_with_domain(b"B", b"payload");
        assert_ne!(a, b);
        assert_eq!(a, HashValue::hash_with_domain(b"A", b"payload"));
    }

    #[test]
    fn length_prefix_prevents_concatenation_collisions() {
        let a = HashValue::hash_with_domain(b"AB", b"C");
        let b = HashValue::hash_with_domain(b"A", b"BC");
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_short() {
        let h = HashValue::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", h), "HashValue(abababab…)");
        assert_eq!(HashValue::zero().as_bytes(), &[0u8; 32]);
    }
}
