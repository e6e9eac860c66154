//! Batch loop-closure detection and recomputation.
//!
//! Detection runs over the whole similarity matrix: the matrix is folded onto
//! its lower triangle, the band around the diagonal (consecutive places,
//! trivially similar) is cleared, and the aligner extracts components.
//! Recomputation then merges the graph and renumbers it densely.

use crate::config::AlignmentConfig;
use crate::error::Result;
use crate::graph::{NodeId, PlaceGraph};

use super::aligner::{Component, LoopClosureAligner};
use super::merger::{GraphMerger, MergeReport};
use super::similarity::SimilarityMatrix;

/// Outcome of a batch recompute.
#[derive(Debug, Clone)]
pub struct RecomputeReport {
    pub components: Vec<Component>,
    pub merge: MergeReport,
    /// New index of every old matrix index, `None` when the place is gone.
    pub id_map: Vec<Option<usize>>,
}

/// Offline loop-closure pipeline.
#[derive(Debug, Clone, Default)]
pub struct LoopClosureDetector {
    aligner: LoopClosureAligner,
}

impl LoopClosureDetector {
    pub fn new(config: AlignmentConfig) -> Self {
        Self {
            aligner: LoopClosureAligner::new(config),
        }
    }

    pub fn config(&self) -> &AlignmentConfig {
        self.aligner.config()
    }

    /// Components of `matrix`, best first. Zero components is normal.
    pub fn detect(&self, matrix: &SimilarityMatrix) -> Vec<Component> {
        let mut folded = matrix.fold();
        folded.zero_diagonal_band(self.config().diagonal_band);
        let components = self.aligner.align(&folded);

        tracing::info!(
            places = matrix.size(),
            components = components.len(),
            "loop closure detection"
        );
        components
    }

    /// Detect, merge, and renumber.
    ///
    /// The graph must be densely numbered so that matrix index `i` is place
    /// `i`. On return it is dense again and `id_map` tells callers how to
    /// carry per-place state across.
    pub fn batch_recompute(&self, graph: &mut PlaceGraph, matrix: &SimilarityMatrix) -> Result<RecomputeReport> {
        let components = self.detect(matrix);
        let merge = GraphMerger::apply_components(graph, &components)?;
        let renumbered = graph.renumber();

        let id_map = (0..matrix.size())
            .map(|i| {
                let id = merge.resolve(NodeId::new(i as u32));
                renumbered.get(&id).map(|n| n.index())
            })
            .collect();

        Ok(RecomputeReport {
            components,
            merge,
            id_map,
        })
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::*;
    use crate::graph::place_graph::tests::chain;

    fn band_matrix(n: usize, row0: usize, col0: usize, len: usize) -> SimilarityMatrix {
        let mut m = DMatrix::zeros(n, n);
        for k in 0..len {
            m[(row0 + k, col0 + k)] = 1.0;
        }
        SimilarityMatrix::from_matrix(m).unwrap()
    }

    #[test]
    fn test_upper_band_is_found_as_transpose() {
        // rows 10..=25 against columns 40..=55
        let sim = band_matrix(80, 10, 40, 16);
        let config = AlignmentConfig::default();
        let components = LoopClosureDetector::new(config.clone()).detect(&sim);

        assert_eq!(components.len(), 1);
        let c = &components[0];
        assert!(!c.reverse);
        assert!(c.len() >= 15);
        assert!(c.score > config.alignment_threshold);
        for &(i, j) in &c.pairs {
            assert!((40..=55).contains(&i));
            assert_eq!(i - 40, j - 10);
        }
    }

    #[test]
    fn test_diagonal_band_is_ignored() {
        // a run hugging the diagonal is consecutive places, not a revisit
        let sim = band_matrix(40, 3, 0, 30);
        assert!(LoopClosureDetector::default().detect(&sim).is_empty());
    }

    #[test]
    fn test_batch_recompute_merges_and_renumbers() {
        let mut graph = chain(40);
        let sim = band_matrix(40, 25, 5, 10);
        let report = LoopClosureDetector::default()
            .batch_recompute(&mut graph, &sim)
            .unwrap();

        assert_eq!(report.components.len(), 1);
        assert_eq!(report.merge.merged, 10);
        assert_eq!(graph.node_count(), 30);
        assert_eq!(graph.node_ids(), (0..30).map(NodeId::new).collect::<Vec<_>>());

        // places 25..=34 collapsed onto 5..=14; 35 moved down to 25
        assert_eq!(report.id_map[30], Some(10));
        assert_eq!(report.id_map[5], Some(5));
        assert_eq!(report.id_map[35], Some(25));
        assert_eq!(report.id_map.len(), 40);
    }

    #[test]
    fn test_batch_recompute_without_components_keeps_graph() {
        let mut graph = chain(12);
        let sim = SimilarityMatrix::from_matrix(DMatrix::zeros(12, 12)).unwrap();
        let report = LoopClosureDetector::default()
            .batch_recompute(&mut graph, &sim)
            .unwrap();
        assert!(report.components.is_empty());
        assert_eq!(graph.node_count(), 12);
        assert_eq!(report.id_map[11], Some(11));
    }
}
