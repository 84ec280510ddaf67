//! Tree and projection configuration.
//!
//! `TreeParams` describe the geometry a pattern tree is generated for;
//! `ProjectionConfig` adds the per-event analysis settings. Both persist as
//! CBOR. Parameters are validated and normalized before any tree allocation
//! happens, so an invalid configuration never leaves partial state behind.

use crate::fingerprint::Canonicalizable;
use serde::{Deserialize, Serialize};

/// Deepest supported tree level. Bins at this level still fit a `u16`.
pub const MAX_DEPTH: u32 = 15;

/// Largest supported number of layers (layer masks are `u32` indices).
pub const MAX_LAYERS: usize = 16;

/// Geometry a pattern tree is generated for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Deepest level of the tree; the root is level 0.
    pub max_depth: u32,
    /// Width of the tracking region (same unit as hit positions).
    pub width: f64,
    /// Layer positions along the beam axis, strictly increasing.
    pub z_positions: Vec<f64>,
    /// Largest track slope (dx/dz) to accept.
    pub max_slope: f64,
}

/// Validated parameters in the units the generator works in.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedParams {
    /// Number of tree levels, `max_depth + 1`.
    pub nlevels: u32,
    /// Layer positions shifted and scaled to `z[0] == 0`, `z[last] == 1`.
    pub z: Vec<f64>,
    /// Largest slope in bins per level-bin over the full z span.
    pub max_slope: f64,
}

impl TreeParams {
    /// Creates a new parameter set.
    pub fn new(max_depth: u32, width: f64, z_positions: Vec<f64>, max_slope: f64) -> Self {
        Self {
            max_depth,
            width,
            z_positions,
            max_slope,
        }
    }

    /// Creates a parameter set from a comma-separated list of z positions.
    ///
    /// Empty tokens are ignored, so `"0,1,,2,"` gives three layers.
    pub fn from_z_list(
        max_depth: u32,
        width: f64,
        z_list: &str,
        max_slope: f64,
    ) -> Result<Self, ConfigError> {
        let mut z_positions = Vec::new();
        for token in z_list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let z = token
                .parse::<f64>()
                .map_err(|_| ConfigError::BadZList(token.to_string()))?;
            z_positions.push(z);
        }
        Ok(Self::new(max_depth, width, z_positions, max_slope))
    }

    /// Number of layers.
    pub fn nlayers(&self) -> usize {
        self.z_positions.len()
    }

    /// Validates the parameters and converts them to generator units.
    pub fn normalize(&self) -> Result<NormalizedParams, ConfigError> {
        if self.max_depth == 0 || self.max_depth > MAX_DEPTH {
            return Err(ConfigError::InvalidDepth(self.max_depth));
        }
        let n = self.z_positions.len();
        if n < 2 {
            return Err(ConfigError::TooFewLayers(n));
        }
        if n > MAX_LAYERS {
            return Err(ConfigError::TooManyLayers(n));
        }
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(ConfigError::InvalidWidth(self.width));
        }
        if !(self.max_slope.is_finite() && self.max_slope >= 0.0) {
            return Err(ConfigError::InvalidSlope(self.max_slope));
        }
        for (i, z) in self.z_positions.iter().enumerate() {
            if !z.is_finite() {
                return Err(ConfigError::NonFiniteZ(i));
            }
            if i > 0 && *z <= self.z_positions[i - 1] {
                return Err(ConfigError::UnorderedLayers(i));
            }
        }
        let z0 = self.z_positions[0];
        let zsize = self.z_positions[n - 1] - z0;
        let mut z: Vec<f64> = self.z_positions.iter().map(|v| (v - z0) / zsize).collect();
        // Pin the end points; the scaled values may round away from them
        z[0] = 0.0;
        z[n - 1] = 1.0;
        Ok(NormalizedParams {
            nlevels: self.max_depth + 1,
            z,
            max_slope: self.max_slope * zsize / self.width,
        })
    }

    /// Serializes the parameters to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let bytes = serde_cbor::to_vec(self)?;
        Ok(bytes)
    }

    /// Deserializes parameters from CBOR bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        let params: Self = serde_cbor::from_slice(bytes)?;
        Ok(params)
    }
}

impl Canonicalizable for TreeParams {
    fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(28 + 8 * self.z_positions.len());
        out.extend_from_slice(&self.max_depth.to_be_bytes());
        out.extend_from_slice(&self.width.to_bits().to_be_bytes());
        out.extend_from_slice(&self.max_slope.to_bits().to_be_bytes());
        out.extend_from_slice(&(self.z_positions.len() as u64).to_be_bytes());
        for z in &self.z_positions {
            out.extend_from_slice(&z.to_bits().to_be_bytes());
        }
        out
    }

    fn fingerprint_domain(&self) -> &'static [u8] {
        b"TREE_PARAMS"
    }
}

/// Per-projection analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Geometry of the pattern tree used by this projection.
    pub tree: TreeParams,
    /// Position of the left edge of the tracking region.
    pub origin: f64,
    /// Layers a tree match may miss.
    pub max_missing_layers: u32,
    /// Search distance in bins when grouping matches into roads.
    pub pattern_max_dist: u32,
    /// Largest distance between two hits of a plane pair.
    pub pair_max_dist: f64,
    /// Accept only paired hits from plane pairs.
    pub pairs_only: bool,
}

impl ProjectionConfig {
    /// Creates a configuration with the default analysis settings.
    ///
    /// The tracking region is centered on zero.
    pub fn new(tree: TreeParams) -> Self {
        let origin = -0.5 * tree.width;
        Self {
            tree,
            origin,
            max_missing_layers: 1,
            pattern_max_dist: 1,
            pair_max_dist: 0.0,
            pairs_only: false,
        }
    }

    /// Validates all settings.
    pub fn validate(&self) -> Result<NormalizedParams, ConfigError> {
        let normalized = self.tree.normalize()?;
        if !self.origin.is_finite() {
            return Err(ConfigError::InvalidOrigin(self.origin));
        }
        if self.max_missing_layers as usize >= self.tree.nlayers() {
            return Err(ConfigError::InvalidMissingLayers(self.max_missing_layers));
        }
        if !(self.pair_max_dist.is_finite() && self.pair_max_dist >= 0.0) {
            return Err(ConfigError::InvalidPairDistance(self.pair_max_dist));
        }
        Ok(normalized)
    }

    /// Serializes the configuration to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let bytes = serde_cbor::to_vec(self)?;
        Ok(bytes)
    }

    /// Deserializes a configuration from CBOR bytes.
    ///
    /// The result is validated before it is returned.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Self = serde_cbor::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration to a file.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
        let bytes = self.to_cbor()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Loads a configuration from a file.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let bytes = std::fs::read(path)?;
        Self::from_cbor(&bytes)
    }
}

/// Error type for invalid configurations.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Tree depth outside `1..=MAX_DEPTH`.
    InvalidDepth(u32),
    /// Fewer than two layers.
    TooFewLayers(usize),
    /// More than `MAX_LAYERS` layers.
    TooManyLayers(usize),
    /// Width not finite and positive.
    InvalidWidth(f64),
    /// Slope not finite and non-negative.
    InvalidSlope(f64),
    /// Layer position at this index is not finite.
    NonFiniteZ(usize),
    /// Layer position at this index does not exceed its predecessor.
    UnorderedLayers(usize),
    /// Token of a z list is not a number.
    BadZList(String),
    /// Origin not finite.
    InvalidOrigin(f64),
    /// Missing-layer allowance leaves no layer to match.
    InvalidMissingLayers(u32),
    /// Pair distance not finite and non-negative.
    InvalidPairDistance(f64),
    /// The tree was generated for other parameters.
    TreeMismatch,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidDepth(d) => {
                write!(f, "invalid tree depth {} (must be 1..={})", d, MAX_DEPTH)
            }
            ConfigError::TooFewLayers(n) => write!(f, "need at least 2 layers, got {}", n),
            ConfigError::TooManyLayers(n) => {
                write!(f, "at most {} layers supported, got {}", MAX_LAYERS, n)
            }
            ConfigError::InvalidWidth(w) => write!(f, "invalid detector width {}", w),
            ConfigError::InvalidSlope(s) => write!(f, "invalid maximum slope {}", s),
            ConfigError::NonFiniteZ(i) => write!(f, "z position of layer {} is not finite", i),
            ConfigError::UnorderedLayers(i) => {
                write!(f, "z position of layer {} does not increase", i)
            }
            ConfigError::BadZList(tok) => write!(f, "invalid z position {:?}", tok),
            ConfigError::InvalidOrigin(o) => write!(f, "invalid origin {}", o),
            ConfigError::InvalidMissingLayers(m) => {
                write!(f, "missing-layer allowance {} leaves no layer to match", m)
            }
            ConfigError::InvalidPairDistance(d) => write!(f, "invalid pair distance {}", d),
            ConfigError::TreeMismatch => write!(f, "tree was generated for other parameters"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TreeParams {
        TreeParams::new(4, 2.0, vec![1.0, 2.0, 3.0], 1.0)
    }

    #[test]
    fn normalize_scales_geometry() {
        let n = params().normalize().unwrap();
        assert_eq!(n.nlevels, 5);
        assert_eq!(n.z, vec![0.0, 0.5, 1.0]);
        // slope 1 over a z span of 2 on a width of 2
        assert_eq!(n.max_slope, 1.0);
    }

    #[test]
    fn normalize_rejects_bad_input() {
        let mut p = params();
        p.max_depth = 0;
        assert_eq!(p.normalize(), Err(ConfigError::InvalidDepth(0)));
        p.max_depth = MAX_DEPTH + 1;
        assert_eq!(p.normalize(), Err(ConfigError::InvalidDepth(MAX_DEPTH + 1)));

        let mut p = params();
        p.z_positions = vec![0.0];
        assert_eq!(p.normalize(), Err(ConfigError::TooFewLayers(1)));
        p.z_positions.clear();
        assert_eq!(p.normalize(), Err(ConfigError::TooFewLayers(0)));
        p.z_positions = (0..17).map(f64::from).collect();
        assert_eq!(p.normalize(), Err(ConfigError::TooManyLayers(17)));

        let mut p = params();
        p.z_positions = vec![0.0, 2.0, 2.0];
        assert_eq!(p.normalize(), Err(ConfigError::UnorderedLayers(2)));
        p.z_positions = vec![0.0, f64::NAN, 2.0];
        assert_eq!(p.normalize(), Err(ConfigError::NonFiniteZ(1)));

        let mut p = params();
        p.width = 0.0;
        assert!(matches!(p.normalize(), Err(ConfigError::InvalidWidth(_))));
        let mut p = params();
        p.max_slope = -1.0;
        assert!(matches!(p.normalize(), Err(ConfigError::InvalidSlope(_))));
    }

    #[test]
    fn z_list_parsing() {
        let p = TreeParams::from_z_list(3, 1.0, "0, 0.5,,1.25,", 0.2).unwrap();
        assert_eq!(p.z_positions, vec![0.0, 0.5, 1.25]);
        assert_eq!(
            TreeParams::from_z_list(3, 1.0, "0,x", 0.2),
            Err(ConfigError::BadZList("x".to_string()))
        );
    }

    #[test]
    fn fingerprint_tracks_every_field() {
        let base = params().fingerprint();
        assert_eq!(base, params().fingerprint());
        let mut p = params();
        p.max_slope = 1.5;
        assert_ne!(base, p.fingerprint());
        let mut p = params();
        p.z_positions[1] = 2.5;
        assert_ne!(base, p.fingerprint());
    }

    #[test]
    fn projection_config_cbor_roundtrip() {
        let mut config = ProjectionConfig::new(params());
        config.pairs_only = true;
        config.pair_max_dist = 0.25;
        let bytes = config.to_cbor().expect("serialization should succeed");
        let decoded = ProjectionConfig::from_cbor(&bytes).expect("deserialization should succeed");
        assert_eq!(decoded, config);
        assert_eq!(decoded.origin, -1.0);
    }

    #[test]
    fn projection_config_file_roundtrip() {
        let config = ProjectionConfig::new(params());
        let path = std::env::temp_dir().join("treesearch_projection_config.cbor");
        config.save_to_file(&path).expect("save should succeed");
        let loaded = ProjectionConfig::load_from_file(&path).expect("load should succeed");
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn projection_config_validation() {
        let mut config = ProjectionConfig::new(params());
        assert!(config.validate().is_ok());
        config.max_missing_layers = 3;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMissingLayers(3)));
        let mut config = ProjectionConfig::new(params());
        config.pair_max_dist = -0.1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPairDistance(_))));
    }
}
