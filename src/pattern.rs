//! Canonical bin patterns and the links between them.
//!
//! A `Pattern` holds one bin index per detector layer. Patterns are stored in
//! canonical form: shifted so that the first layer sits in bin 0 and, when
//! the track runs towards smaller bins, mirrored so that the last layer holds
//! the largest bin. The actual pattern a link stands for is recovered from the
//! link's `LinkType` (see `walk::NodeDescriptor`).
//!
//! # Invariants
//! - `bits[0] == 0` for every stored pattern.
//! - All bins lie in `0..=width()`, where `width()` is `bits[last]`.

use crate::arena::PatternId;
use std::fmt;
use std::ops::Index;

/// Bin index at one layer. Sixteen bits cover trees up to 15 levels below the root.
pub type Bin = u16;

/// A canonical multi-layer bin pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pattern {
    bits: Box<[Bin]>,
}

impl Pattern {
    /// The all-zero pattern: the root of every tree.
    pub fn root(nlayers: usize) -> Self {
        Self {
            bits: vec![0; nlayers].into_boxed_slice(),
        }
    }

    /// Creates a pattern from raw bins.
    pub fn from_bits(bits: Vec<Bin>) -> Self {
        Self {
            bits: bits.into_boxed_slice(),
        }
    }

    /// Number of layers.
    #[inline]
    pub fn nlayers(&self) -> usize {
        self.bits.len()
    }

    /// Bins, one per layer.
    #[inline]
    pub fn bits(&self) -> &[Bin] {
        &self.bits
    }

    /// Signed span between the last and the first layer.
    ///
    /// Non-negative for canonical patterns. A negative value marks a raw
    /// pattern that must be mirrored to become canonical.
    pub fn width(&self) -> i32 {
        match (self.bits.first(), self.bits.last()) {
            (Some(&first), Some(&last)) => i32::from(last) - i32::from(first),
            _ => 0,
        }
    }

    /// Bucket hash used by the generator's registry.
    pub fn bucket_hash(&self) -> u32 {
        let h = self
            .bits
            .iter()
            .fold(0x811c_9dc5u32, |h, &b| (h ^ u32::from(b)).wrapping_mul(0x0100_0193));
        h ^ (h >> 15)
    }
}

impl Index<usize> for Pattern {
    type Output = Bin;

    #[inline]
    fn index(&self, layer: usize) -> &Bin {
        &self.bits[layer]
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, b) in self.bits.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", b)?;
        }
        write!(f, "]")
    }
}

/// Transform that turns a canonical child pattern into the actual child.
///
/// The discriminant is the low part of the tag byte of the persisted tree.
/// Shifted-and-mirrored (3) never occurs: mirrored links only leave the
/// root, whose children never need a shift at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum LinkType {
    /// Child is the canonical pattern itself.
    Plain = 0,
    /// Child is the canonical pattern moved one bin to the right.
    Shifted = 1,
    /// Child is the mirror image of the canonical pattern.
    Mirrored = 2,
}

impl LinkType {
    /// Decodes the transform bits of a tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(LinkType::Plain),
            1 => Some(LinkType::Shifted),
            2 => Some(LinkType::Mirrored),
            _ => None,
        }
    }

    /// Transform bits for the tag byte.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Bin shift contributed by this link (0 or 1).
    #[inline]
    pub fn shift(self) -> u32 {
        u32::from(self == LinkType::Shifted)
    }

    /// Whether this link mirrors its child.
    #[inline]
    pub fn is_mirrored(self) -> bool {
        self == LinkType::Mirrored
    }
}

/// Edge from a parent pattern to a (shared) child pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
    /// Canonical child node.
    pub pattern: PatternId,
    /// Transform applied to the child.
    pub kind: LinkType,
}

impl Link {
    /// Creates a new link.
    #[inline]
    pub const fn new(pattern: PatternId, kind: LinkType) -> Self {
        Self { pattern, kind }
    }
}
