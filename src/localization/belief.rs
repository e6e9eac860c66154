//! Markov localization over the place graph.
//!
//! The belief lives on the nodes themselves (`pdf0` predicted, `pdf1`
//! posterior), so merges and renumbering carry it along for free.

use crate::config::BeliefConfig;
use crate::error::{Error, Result};
use crate::features::{FeatureMatcher, FeatureSet};
use crate::graph::{EdgeId, NodeId, PlaceGraph};

/// Totals at or below this are not normalized.
const MIN_MASS: f64 = 1e-6;

/// Recursive Bayesian estimate of the current place.
#[derive(Debug, Clone, Default)]
pub struct BeliefEstimator {
    config: BeliefConfig,
}

impl BeliefEstimator {
    pub fn new(config: BeliefConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BeliefConfig {
        &self.config
    }

    /// Put all the mass on `node`.
    pub fn init(&self, graph: &mut PlaceGraph, node: NodeId) -> Result<()> {
        graph.find_node_by_id(node)?;
        graph.clear_belief();
        let n = graph.node_mut(node)?;
        n.pdf0 = 1.0;
        n.pdf1 = 1.0;
        tracing::debug!(%node, "belief initialized");
        Ok(())
    }

    /// Predict: diffuse `pdf1` over `transition_radius` hops into `pdf0`.
    ///
    /// Each place collects `pdf1 · exp(-depth² / 2σ²)` from its neighborhood,
    /// counting depth from 1 at the place itself.
    /// If the result carries no mass the previous `pdf0` is kept.
    pub fn transition_update(&self, graph: &mut PlaceGraph) -> Result<()> {
        let two_sigma2 = 2.0 * self.config.sigma * self.config.sigma;

        let mut predicted = Vec::with_capacity(graph.node_count());
        for id in graph.node_ids() {
            let mut mass = 0.0;
            for (other, depth) in graph.expand_tree(id, self.config.transition_radius)? {
                let d = (depth + 1) as f64;
                mass += graph.find_node_by_id(other)?.pdf1 * (-(d * d) / two_sigma2).exp();
            }
            predicted.push((id, mass));
        }

        let total: f64 = predicted.iter().map(|(_, m)| m).sum();
        if total <= MIN_MASS {
            tracing::debug!(total, "transition update carried no mass, prior kept");
            return Ok(());
        }
        for (id, mass) in predicted {
            graph.node_mut(id)?.pdf0 = mass / total;
        }
        Ok(())
    }

    /// Correct with an observation seen while traversing `current_edge`.
    ///
    /// Every place within `observation_radius` of the edge start gets
    /// `pdf1 = pdf0 · (1 - psi)` against its reference features; all other
    /// places drop to zero. Returns the depth-weighted spread of the
    /// posterior, a confidence signal (small means peaked near the edge).
    pub fn observation_update(
        &self,
        graph: &mut PlaceGraph,
        current_edge: EdgeId,
        observed: &FeatureSet,
        matcher: &dyn FeatureMatcher,
    ) -> Result<f64> {
        let root = graph
            .edge(current_edge)
            .and_then(|e| e.start)
            .ok_or_else(|| Error::GraphInconsistency(format!("edge {} has no start place", current_edge)))?;

        let mut psi = Vec::new();
        for (id, _) in graph.expand_tree(root, self.config.observation_radius)? {
            let d = match graph.reference_evidence(id) {
                Some(ev) => matcher.psi_distance(observed, &ev.features)?,
                None => 1.0,
            };
            psi.push((id, d));
        }
        let psi: std::collections::HashMap<NodeId, f64> = psi.into_iter().collect();

        self.observation_update_with(graph, root, |id| {
            psi.get(&id).copied().ok_or(Error::NodeNotFound(id))
        })
    }

    /// Observation update with an arbitrary psi function.
    ///
    /// All psi values are computed before any belief changes, so an error
    /// leaves the previous belief in place.
    pub fn observation_update_with<F>(&self, graph: &mut PlaceGraph, root: NodeId, mut psi: F) -> Result<f64>
    where
        F: FnMut(NodeId) -> Result<f64>,
    {
        let radius = self.config.observation_radius;
        let tree = graph.expand_tree(root, radius)?;

        let mut likelihood = Vec::with_capacity(tree.len());
        for &(id, depth) in &tree {
            let p = 1.0 - psi(id)?.clamp(0.0, 1.0);
            likelihood.push((id, depth, p));
        }

        let in_tree: std::collections::HashSet<NodeId> = tree.iter().map(|&(id, _)| id).collect();
        for node in graph.nodes_mut() {
            if !in_tree.contains(&node.id) {
                node.pdf0 = 0.0;
                node.pdf1 = 0.0;
            }
        }

        let mut variance = 0.0;
        for &(id, depth, p) in &likelihood {
            let node = graph.node_mut(id)?;
            node.pdf1 = node.pdf0 * p;
            let d = (depth + 1) as f64;
            variance += node.pdf1 * d * d;
        }
        if radius > 0 {
            variance /= radius as f64;
        }

        let total: f64 = graph.nodes().map(|n| n.pdf1).sum();
        if total > MIN_MASS {
            for node in graph.nodes_mut() {
                node.pdf1 /= total;
            }
        } else {
            tracing::debug!(total, "observation update left belief unnormalized");
        }

        tracing::debug!(%root, places = tree.len(), variance, "observation update");
        Ok(variance)
    }

    /// Place with the highest posterior, first one on ties. `None` when the
    /// posterior carries no mass.
    pub fn find_maximum(&self, graph: &PlaceGraph) -> Option<NodeId> {
        let total: f64 = graph.nodes().map(|n| n.pdf1).sum();
        if total <= MIN_MASS {
            return None;
        }
        let mut best: Option<(NodeId, f64)> = None;
        for node in graph.nodes() {
            if best.is_none_or(|(_, p)| node.pdf1 > p) {
                best = Some((node.id, node.pdf1));
            }
        }
        best.map(|(id, _)| id)
    }

    /// `(place, pdf1)` for every place, in storage order.
    pub fn belief(&self, graph: &PlaceGraph) -> Vec<(NodeId, f64)> {
        graph.nodes().map(|n| (n.id, n.pdf1)).collect()
    }
}
