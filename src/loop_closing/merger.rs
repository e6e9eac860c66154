//! Apply loop-closure components to the place graph.
//!
//! Matrix index `i` is place `NodeId(i)`, which holds as long as ids are
//! dense. Callers renumber after a merge pass before appending new rows.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::graph::{NodeId, PlaceGraph};

use super::aligner::Component;

/// Places closer than this in id order are never merged.
const MIN_MERGE_GAP: u32 = 2;

/// What a merge pass did to the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub components: usize,
    pub merged: usize,
    pub skipped: usize,
    pub span_edges_removed: usize,
    pub singletons_removed: usize,
    pub edges_repaired: usize,
    /// Every merged-away place and the place that absorbed it.
    pub redirects: HashMap<NodeId, NodeId>,
}

impl MergeReport {
    /// Follow redirects to the place that now stands for `id`.
    pub fn resolve(&self, mut id: NodeId) -> NodeId {
        while let Some(&keep) = self.redirects.get(&id) {
            id = keep;
        }
        id
    }
}

/// Folds matched place sequences into each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphMerger;

impl GraphMerger {
    /// Merge every correspondence of every component.
    ///
    /// For each component, links between consecutive ids inside the span of
    /// its `i` side are cut first. Each pair then merges its larger id into
    /// its smaller one, and the removed id is rewritten in all pairs still to
    /// come. If anything changed, singletons are removed and edge symmetry
    /// restored at the end.
    pub fn apply_components(graph: &mut PlaceGraph, components: &[Component]) -> Result<MergeReport> {
        let mut work: Vec<Vec<(u32, u32)>> = components
            .iter()
            .map(|c| c.pairs.iter().map(|&(i, j)| (i as u32, j as u32)).collect())
            .collect();

        let mut report = MergeReport {
            components: components.len(),
            ..Default::default()
        };

        for c in 0..work.len() {
            let lo = work[c].iter().map(|p| p.0).min();
            let hi = work[c].iter().map(|p| p.0).max();
            if let (Some(lo), Some(hi)) = (lo, hi) {
                for key in lo..hi {
                    let (a, b) = (NodeId::new(key), NodeId::new(key + 1));
                    if !graph.contains_node(a) || !graph.contains_node(b) {
                        continue;
                    }
                    match graph.remove_edge_by_id(a, b) {
                        Ok(()) => report.span_edges_removed += 1,
                        Err(Error::EdgeNotFound { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
            }

            for p in 0..work[c].len() {
                let (i, j) = work[c][p];
                let (keep, drop) = (i.min(j), i.max(j));
                if drop - keep < MIN_MERGE_GAP {
                    report.skipped += 1;
                    continue;
                }
                let (keep_id, drop_id) = (NodeId::new(keep), NodeId::new(drop));
                if !graph.contains_node(keep_id) || !graph.contains_node(drop_id) {
                    tracing::warn!(keep = %keep_id, drop = %drop_id, "merge pair references a missing place");
                    report.skipped += 1;
                    continue;
                }

                graph.merge_nodes(keep_id, drop_id)?;
                report.merged += 1;
                report.redirects.insert(drop_id, keep_id);

                for (c3, pairs) in work.iter_mut().enumerate().skip(c) {
                    for (p3, pair) in pairs.iter_mut().enumerate() {
                        if c3 == c && p3 == p {
                            continue;
                        }
                        if pair.0 == drop {
                            pair.0 = keep;
                        }
                        if pair.1 == drop {
                            pair.1 = keep;
                        }
                    }
                }
            }
        }

        // nothing was cut or merged, so there is nothing to repair
        if report.merged > 0 || report.span_edges_removed > 0 {
            report.singletons_removed = graph.remove_singletons();
            report.edges_repaired = graph.enforce_edge_symmetry();
        }

        tracing::info!(
            components = report.components,
            merged = report.merged,
            skipped = report.skipped,
            places = graph.node_count(),
            "applied loop closure"
        );
        Ok(report)
    }

    /// Merge place range `x0..=x1` onto `y0..=y1`.
    pub fn join_nodes(graph: &mut PlaceGraph, x0: u32, x1: u32, y0: u32, y1: u32) -> Result<MergeReport> {
        for id in [x0, x1, y0, y1] {
            graph.find_node_by_id(NodeId::new(id))?;
        }
        let component = synthesize_component(x0, x1, y0, y1);
        tracing::info!(x0, x1, y0, y1, pairs = component.len(), "joining place ranges");
        Self::apply_components(graph, std::slice::from_ref(&component))
    }
}

/// Pair two index ranges step by step along the longer one.
///
/// The component is reversed when the ranges run in opposite directions.
pub fn synthesize_component(x0: u32, x1: u32, y0: u32, y1: u32) -> Component {
    let dx = x1 as f64 - x0 as f64;
    let dy = y1 as f64 - y0 as f64;
    let steps = x0.abs_diff(x1).max(y0.abs_diff(y1));
    let reverse = (dx > 0.0 && dy < 0.0) || (dx < 0.0 && dy > 0.0);

    let pairs = (0..=steps)
        .map(|s| {
            let t = if steps == 0 { 0.0 } else { s as f64 / steps as f64 };
            let i = (x0 as f64 + dx * t).round() as usize;
            let j = (y0 as f64 + dy * t).round() as usize;
            (i, j)
        })
        .collect();

    let mut component = Component::new(pairs, 0.0, reverse);
    component.cleanup();
    component
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::place_graph::tests::{chain, link};

    #[test]
    fn test_synthesize_forward_and_reverse() {
        let c = synthesize_component(20, 24, 2, 6);
        assert!(!c.reverse);
        assert_eq!(c.pairs, vec![(20, 2), (21, 3), (22, 4), (23, 5), (24, 6)]);

        let c = synthesize_component(20, 24, 6, 2);
        assert!(c.reverse);
        assert_eq!(c.pairs.first(), Some(&(20, 6)));
        assert_eq!(c.pairs.last(), Some(&(24, 2)));

        // the longer range drives the steps; cleanup makes it one-to-one
        let c = synthesize_component(10, 12, 0, 6);
        assert_eq!(c.pairs, vec![(10, 0), (11, 2), (12, 5)]);
    }

    #[test]
    fn test_no_components_leaves_lone_place() {
        let mut g = PlaceGraph::new();
        g.add_node(0, false);
        let report = GraphMerger::apply_components(&mut g, &[]).unwrap();
        assert_eq!(report.singletons_removed, 0);
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn test_reverse_revisit_collapses_corridor() {
        // out to 10 and back: 11..=19 revisit 9..=1
        let mut g = chain(20);
        let pairs: Vec<(usize, usize)> = (1..10).map(|m| (10 + m, 10 - m)).collect();
        let c = Component::new(pairs, 5.0, true);
        let report = GraphMerger::apply_components(&mut g, &[c]).unwrap();

        assert_eq!(report.merged, 9);
        assert_eq!(report.span_edges_removed, 8);
        assert_eq!(g.node_count(), 11);
        for id in 11..20 {
            assert!(!g.contains_node(NodeId::new(id)));
        }
        for e in g.edges() {
            for end in [e.start, e.end].into_iter().flatten() {
                assert!(end.0 < 11);
            }
        }
        // symmetric after repair
        for e in g.edges() {
            if let (Some(s), Some(t)) = (e.start, e.end) {
                assert!(g.find_edge(t, Some(s)).is_some());
            }
        }
    }

    #[test]
    fn test_forward_revisit_keeps_older_places() {
        // loop: 0..=14 then 15..=19 drive over 3..=7 again
        let mut g = chain(20);
        let pairs: Vec<(usize, usize)> = (0..5).rev().map(|k| (15 + k, 3 + k)).collect();
        let c = Component::new(pairs, 4.0, false);
        let report = GraphMerger::apply_components(&mut g, &[c]).unwrap();

        assert_eq!(report.merged, 5);
        assert_eq!(report.span_edges_removed, 4);
        for id in 15..20 {
            assert!(!g.contains_node(NodeId::new(id)));
        }
        // 14 used to lead into 15, which is now 3
        assert!(g.find_edge(NodeId::new(14), Some(NodeId::new(3))).is_some());
        assert!(g.find_edge(NodeId::new(3), Some(NodeId::new(4))).is_some());
    }

    #[test]
    fn test_later_pairs_follow_merged_ids() {
        let mut g = chain(12);
        // 9 -> 2 first; then a pair naming 9 must hit 2 instead
        let first = Component::new(vec![(9, 2)], 1.0, false);
        let second = Component::new(vec![(11, 9)], 1.0, false);
        let report = GraphMerger::apply_components(&mut g, &[first, second]).unwrap();
        assert_eq!(report.merged, 2);
        assert!(!g.contains_node(NodeId::new(9)));
        assert!(!g.contains_node(NodeId::new(11)));
        assert!(g.contains_node(NodeId::new(2)));
        assert_eq!(report.resolve(NodeId::new(11)), NodeId::new(2));
        assert_eq!(report.resolve(NodeId::new(5)), NodeId::new(5));
    }

    #[test]
    fn test_adjacent_pairs_are_skipped() {
        let mut g = chain(5);
        let c = Component::new(vec![(3, 2), (3, 3)], 1.0, false);
        let report = GraphMerger::apply_components(&mut g, &[c]).unwrap();
        assert_eq!(report.merged, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(g.node_count(), 5);
    }

    #[test]
    fn test_join_nodes_requires_existing_places() {
        let mut g = chain(6);
        let err = GraphMerger::join_nodes(&mut g, 4, 40, 0, 1).unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(_)));
        assert_eq!(g.node_count(), 6);
    }

    #[test]
    fn test_join_nodes_merges_ranges() {
        let mut g = chain(10);
        link(&mut g, NodeId::new(9), NodeId::new(0));
        let report = GraphMerger::join_nodes(&mut g, 7, 9, 2, 4).unwrap();
        assert_eq!(report.merged, 3);
        assert_eq!(g.node_count(), 7);
        assert!(g.find_edge(NodeId::new(4), Some(NodeId::new(0))).is_some());
    }
}
