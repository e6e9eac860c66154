//! Configuration for the localization core.
//!
//! Every parameter has a default tuned for walking-speed indoor sequences.
//! A YAML file only needs to list the values it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vocabulary: VocabularyConfig,
    pub alignment: AlignmentConfig,
    pub belief: BeliefConfig,
    pub node_trigger: NodeTriggerConfig,
    pub system: SystemConfig,
}

impl Config {
    /// Load a configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&text)
    }

    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        Ok(config)
    }
}

/// Visual vocabulary parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    /// Acceptance radius on the squared distance `2 - 2·dot`.
    /// Default: 0.30
    pub radius: f64,

    /// A tree leaf holding more bags than this is split by k-means.
    /// Default: 500
    pub max_leaf_bags: usize,

    /// Number of children produced by one k-means split.
    /// Default: 10
    pub kmeans_children: usize,

    /// Iteration cap for one k-means split.
    /// Default: 100
    pub kmeans_max_iterations: usize,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            radius: 0.30,
            max_leaf_bags: 500,
            kmeans_children: 10,
            kmeans_max_iterations: 100,
        }
    }
}

/// Loop-closure alignment parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Similarity cells below this value do not take part in the alignment.
    /// Default: 0.001
    pub similarity_threshold: f64,

    /// Penalty applied to LEFT/UP (gap) moves.
    /// Default: 0.0001
    pub gap_penalty: f64,

    /// Minimum peak score for a component seed.
    /// Default: 0.15
    pub alignment_threshold: f64,

    /// Backtracking stops below this score.
    /// Default: 0.005
    pub tail_threshold: f64,

    /// Shorter components are discarded.
    /// Default: 3
    pub min_seq_length: usize,

    /// Forward components must leave the diagonal by more than this.
    /// Default: 10
    pub min_diag_distance: usize,

    /// Maximum deviation from the ±45° diagonal direction, in degrees.
    /// Default: 25
    pub max_slope_error_deg: f64,

    /// Half-width of the non-maximum suppression window.
    /// Default: 10
    pub search_radius: usize,

    /// Pairs where both ids are at or below this value are skipped.
    /// Default: 0
    pub min_node_id: usize,

    /// Cells with |i - j| below this are zeroed before batch detection.
    /// Default: 10
    pub diagonal_band: usize,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.001,
            gap_penalty: 0.0001,
            alignment_threshold: 0.15,
            tail_threshold: 0.005,
            min_seq_length: 3,
            min_diag_distance: 10,
            max_slope_error_deg: 25.0,
            search_radius: 10,
            min_node_id: 0,
            diagonal_band: 10,
        }
    }
}

/// Markov localization parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BeliefConfig {
    /// Hop radius of the transition diffusion.
    /// Default: 5
    pub transition_radius: usize,

    /// Hop radius of the observation neighborhood.
    /// Default: 5
    pub observation_radius: usize,

    /// Width of the Gaussian motion kernel, in hops.
    /// Default: 1.0
    pub sigma: f64,
}

impl Default for BeliefConfig {
    fn default() -> Self {
        Self {
            transition_radius: 5,
            observation_radius: 5,
            sigma: 1.0,
        }
    }
}

/// New-place detection during exploration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeTriggerConfig {
    /// Number of psi-distances averaged.
    /// Default: 10
    pub window: usize,

    /// Mean psi-distance above which a new place is created.
    /// Default: 0.80
    pub psi_threshold: f64,

    /// Minimum time between two new places, in seconds.
    /// Default: 1.0
    pub min_interval_secs: f64,
}

impl Default for NodeTriggerConfig {
    fn default() -> Self {
        Self {
            window: 10,
            psi_threshold: 0.80,
            min_interval_secs: 1.0,
        }
    }
}

/// Orchestrator parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Capacity of the pending-observation queue.
    /// Default: 100
    pub queue_capacity: usize,

    /// Run batch loop closure every N new places (0 disables it).
    /// Default: 0
    pub recompute_every: usize,

    /// Use the tree-accelerated vocabulary.
    /// Default: true
    pub tree_vocabulary: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            recompute_every: 0,
            tree_vocabulary: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!((config.vocabulary.radius - 0.30).abs() < 1e-12);
        assert_eq!(config.alignment.min_seq_length, 3);
        assert_eq!(config.system.queue_capacity, 100);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "alignment:\n  alignment_threshold: 0.5\nbelief:\n  sigma: 2.0\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert!((config.alignment.alignment_threshold - 0.5).abs() < 1e-12);
        assert!((config.belief.sigma - 2.0).abs() < 1e-12);
        assert_eq!(config.alignment.search_radius, 10);
        assert_eq!(config.vocabulary.max_leaf_bags, 500);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topoloc.yaml");
        std::fs::write(&path, "system:\n  queue_capacity: 4\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.system.queue_capacity, 4);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = Config::from_yaml("belief: [1, 2").unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }
}
