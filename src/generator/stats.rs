use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Statistics of one tree build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Canonical patterns in the build graph.
    pub n_patterns: usize,
    /// Child links in the build graph.
    pub n_links: usize,
    /// Longest child list of any pattern.
    pub max_child_list_length: usize,
    /// Longest hash bucket chain.
    pub max_hash_depth: usize,
    /// Estimated bytes held by patterns and links.
    pub n_bytes: usize,
    /// Bytes held by the hash table.
    pub n_hash_bytes: usize,
    /// Wall-clock duration of the build.
    pub build_time: Duration,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total number of patterns:  {}", self.n_patterns)?;
        writeln!(f, "Total number of links:     {}", self.n_links)?;
        writeln!(f, "Max child list length:     {}", self.max_child_list_length)?;
        writeln!(f, "Max hash chain depth:      {}", self.max_hash_depth)?;
        writeln!(
            f,
            "Tree memory:               {} bytes ({:.2} MiB)",
            self.n_bytes,
            self.n_bytes as f64 / (1024.0 * 1024.0)
        )?;
        writeln!(f, "Hash table memory:         {} bytes", self.n_hash_bytes)?;
        write!(f, "Build time:                {:.3} s", self.build_time.as_secs_f64())
    }
}
