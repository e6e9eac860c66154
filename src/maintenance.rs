//! Offline map maintenance.
//!
//! Library entry points for the operations the `topoloc` binary exposes.
//! All of them need exclusive access to the graph, so they run either on a
//! map loaded from disk or on the state handed back by
//! [`Orchestrator::into_context`](crate::system::Orchestrator::into_context).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::AlignmentConfig;
use crate::error::{Error, Result};
use crate::graph::{NodeId, PlaceGraph};
use crate::loop_closing::{GraphMerger, LoopClosureDetector, MergeReport, RecomputeReport, SimilarityMatrix};

/// File the similarity matrix is kept in next to a map.
pub fn similarity_path(map_path: &Path) -> PathBuf {
    map_path.with_extension("sim.txt")
}

/// Load a map and, if present, the similarity matrix saved next to it.
pub fn load_map(path: &Path) -> Result<(PlaceGraph, Option<SimilarityMatrix>)> {
    let graph = PlaceGraph::load(path)?;
    let sim_path = similarity_path(path);
    let matrix = if sim_path.exists() {
        Some(SimilarityMatrix::read(&sim_path)?)
    } else {
        None
    };
    Ok((graph, matrix))
}

/// Save a map, plus its similarity matrix when given.
pub fn save_map(path: &Path, graph: &PlaceGraph, matrix: Option<&SimilarityMatrix>) -> Result<()> {
    graph.save(path)?;
    if let Some(matrix) = matrix {
        matrix.write(similarity_path(path))?;
    }
    Ok(())
}

/// Fold `drop` into `keep`, then repair sibling motion types.
pub fn merge_nodes_by_id(graph: &mut PlaceGraph, keep: NodeId, drop: NodeId) -> Result<()> {
    graph.find_node_by_id(keep)?;
    graph.find_node_by_id(drop)?;
    graph.merge_nodes(keep, drop)?;
    let repaired = graph.enforce_edge_symmetry();
    tracing::info!(%keep, %drop, repaired, "merged places");
    Ok(())
}

/// Remove the edges between `a` and `b` in both directions.
pub fn remove_edge_by_id(graph: &mut PlaceGraph, a: NodeId, b: NodeId) -> Result<()> {
    graph.remove_edge_by_id(a, b)?;
    tracing::info!(%a, %b, "removed edge");
    Ok(())
}

/// Pair places `x0..=x1` with `y0..=y1` and merge them.
pub fn join_nodes(graph: &mut PlaceGraph, x0: u32, x1: u32, y0: u32, y1: u32) -> Result<MergeReport> {
    let report = GraphMerger::join_nodes(graph, x0, x1, y0, y1)?;
    tracing::info!(x0, x1, y0, y1, merged = report.merged, "joined ranges");
    Ok(report)
}

/// Detect loop closures over `matrix`, merge, and renumber.
///
/// The matrix must describe the graph as it is: one row per place, densely
/// numbered.
pub fn batch_recompute(
    graph: &mut PlaceGraph,
    matrix: &SimilarityMatrix,
    config: &AlignmentConfig,
) -> Result<RecomputeReport> {
    if matrix.size() != graph.node_count() {
        return Err(Error::MalformedInput(format!(
            "similarity matrix is {}x{} but the map has {} places",
            matrix.size(),
            matrix.size(),
            graph.node_count()
        )));
    }
    let dense = graph.nodes().enumerate().all(|(i, n)| n.id.index() == i);
    if !dense {
        return Err(Error::GraphInconsistency(
            "map must be renumbered before batch recompute".into(),
        ));
    }
    LoopClosureDetector::new(config.clone()).batch_recompute(graph, matrix)
}

/// Densely renumber the map, oldest place first.
pub fn renumber(graph: &mut PlaceGraph) -> HashMap<NodeId, NodeId> {
    let mapping = graph.renumber();
    let moved = mapping.iter().filter(|(old, new)| old != new).count();
    tracing::info!(places = mapping.len(), moved, "renumbered map");
    mapping
}

/// Counts shown by `topoloc info`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapSummary {
    pub nodes: usize,
    pub edges: usize,
    pub open_edges: usize,
    pub checkpoints: usize,
    pub labels: Vec<(NodeId, String)>,
    /// True if ids are `0..nodes` in storage order.
    pub dense: bool,
}

pub fn summarize(graph: &PlaceGraph) -> MapSummary {
    MapSummary {
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        open_edges: graph.edges().filter(|e| !e.is_closed()).count(),
        checkpoints: graph.nodes().filter(|n| n.checkpoint).count(),
        labels: graph
            .nodes()
            .filter_map(|n| n.label.clone().map(|l| (n.id, l)))
            .collect(),
        dense: graph.nodes().enumerate().all(|(i, n)| n.id.index() == i),
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::*;
    use crate::graph::place_graph::tests::chain;

    #[test]
    fn test_save_and_load_with_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walk.map");
        let graph = chain(4);
        let mut matrix = SimilarityMatrix::new();
        for k in 0..4 {
            matrix.append_row(&vec![0.25; k]).unwrap();
        }

        save_map(&path, &graph, Some(&matrix)).unwrap();
        assert!(similarity_path(&path).exists());
        let (loaded, loaded_matrix) = load_map(&path).unwrap();
        assert_eq!(loaded.node_count(), 4);
        assert_eq!(loaded_matrix, Some(matrix));
    }

    #[test]
    fn test_load_without_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walk.map");
        save_map(&path, &chain(2), None).unwrap();
        let (_, matrix) = load_map(&path).unwrap();
        assert!(matrix.is_none());
    }

    #[test]
    fn test_merge_and_remove_edge() {
        let mut graph = chain(5);
        merge_nodes_by_id(&mut graph, NodeId::new(1), NodeId::new(3)).unwrap();
        assert_eq!(graph.node_count(), 4);
        assert!(graph.find_edge(NodeId::new(1), Some(NodeId::new(4))).is_some());

        remove_edge_by_id(&mut graph, NodeId::new(1), NodeId::new(4)).unwrap();
        assert!(graph.find_edge(NodeId::new(4), Some(NodeId::new(1))).is_none());
        assert!(matches!(
            remove_edge_by_id(&mut graph, NodeId::new(1), NodeId::new(4)),
            Err(Error::EdgeNotFound { .. })
        ));
        assert!(matches!(
            merge_nodes_by_id(&mut graph, NodeId::new(1), NodeId::new(1)),
            Err(Error::SelfMerge(_))
        ));
        assert!(matches!(
            merge_nodes_by_id(&mut graph, NodeId::new(1), NodeId::new(9)),
            Err(Error::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_batch_recompute_checks_matrix_size() {
        let mut graph = chain(6);
        let matrix = SimilarityMatrix::from_matrix(DMatrix::zeros(4, 4)).unwrap();
        let err = batch_recompute(&mut graph, &matrix, &AlignmentConfig::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn test_batch_recompute_requires_dense_ids() {
        let mut graph = chain(4);
        merge_nodes_by_id(&mut graph, NodeId::new(0), NodeId::new(2)).unwrap();
        let matrix = SimilarityMatrix::from_matrix(DMatrix::zeros(3, 3)).unwrap();
        let err = batch_recompute(&mut graph, &matrix, &AlignmentConfig::default()).unwrap_err();
        assert!(matches!(err, Error::GraphInconsistency(_)));

        renumber(&mut graph);
        assert!(summarize(&graph).dense);
        let report = batch_recompute(&mut graph, &matrix, &AlignmentConfig::default()).unwrap();
        assert!(report.components.is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let mut graph = chain(3);
        graph.node_mut(NodeId::new(1)).unwrap().label = Some("elevator".into());
        graph.node_mut(NodeId::new(2)).unwrap().checkpoint = true;
        let summary = summarize(&graph);
        assert_eq!(summary.nodes, 3);
        assert_eq!(summary.edges, 4);
        assert_eq!(summary.open_edges, 0);
        assert_eq!(summary.checkpoints, 1);
        assert_eq!(summary.labels, vec![(NodeId::new(1), "elevator".to_string())]);
        assert!(summary.dense);
    }
}
