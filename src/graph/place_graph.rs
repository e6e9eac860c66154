//! PlaceGraph - Arena of places and traversals.
//!
//! Nodes live in a contiguous vector in creation order; an alias map gives
//! O(1) lookup from [`NodeId`] to slot. Edges live in an ordered map keyed by
//! [`EdgeId`]. Every cross-reference is an id resolved through the graph.
//!
//! Structural operations (merge, renumber, symmetry repair) are meant to be
//! driven by the single owning worker; none of them is reentrant.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::features::Evidence;

use super::edge::Edge;
use super::node::Node;
use super::types::{EdgeId, MotionType, NodeId};

/// Topological map of places connected by directed traversals.
#[derive(Debug, Clone, Default)]
pub struct PlaceGraph {
    /// Nodes in creation (or load) order.
    nodes: Vec<Node>,

    /// NodeId -> slot in `nodes`.
    alias: HashMap<NodeId, usize>,

    /// All edges, ordered by creation.
    edges: BTreeMap<EdgeId, Edge>,

    next_node_id: u32,
    next_edge_id: u64,
}

impl PlaceGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // ID Generation
    // ─────────────────────────────────────────────────────────────────────────

    fn next_node_id(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn next_edge_id(&mut self) -> EdgeId {
        let id = EdgeId::new(self.next_edge_id);
        self.next_edge_id += 1;
        id
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Node Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new place and return its id.
    pub fn add_node(&mut self, timestamp: i64, checkpoint: bool) -> NodeId {
        let id = self.next_node_id();
        self.push_node(Node::new(id, timestamp, checkpoint));
        id
    }

    /// Insert a node with a caller-chosen id (map loading).
    pub(crate) fn insert_node(&mut self, node: Node) -> Result<()> {
        if self.alias.contains_key(&node.id) {
            return Err(Error::GraphInconsistency(format!(
                "duplicate node id {}",
                node.id
            )));
        }
        self.next_node_id = self.next_node_id.max(node.id.0 + 1);
        self.push_node(Node {
            edges: Vec::new(),
            ..node
        });
        Ok(())
    }

    fn push_node(&mut self, node: Node) {
        self.alias.insert(node.id, self.nodes.len());
        self.nodes.push(node);
    }

    /// Look up a node. Fails with `NodeNotFound` if absent.
    pub fn find_node_by_id(&self, id: NodeId) -> Result<&Node> {
        self.alias
            .get(&id)
            .map(|&slot| &self.nodes[slot])
            .ok_or(Error::NodeNotFound(id))
    }

    /// Mutable node lookup.
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        match self.alias.get(&id) {
            Some(&slot) => Ok(&mut self.nodes[slot]),
            None => Err(Error::NodeNotFound(id)),
        }
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.alias.contains_key(&id)
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    /// Most recently created node.
    pub fn last_node_id(&self) -> Option<NodeId> {
        self.nodes.last().map(|n| n.id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Detach a node entry and re-index the slots behind it.
    fn remove_node_entry(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.alias.remove(&id)?;
        let node = self.nodes.remove(slot);
        for (offset, n) in self.nodes[slot..].iter().enumerate() {
            self.alias.insert(n.id, slot + offset);
        }
        Some(node)
    }

    /// Remove a node together with every edge touching it.
    fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let touching: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| e.touches(id))
            .map(|e| e.id)
            .collect();
        for eid in touching {
            self.remove_edge(eid);
        }
        self.remove_node_entry(id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Edge Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a directed edge. Both endpoints, when set, must exist.
    pub fn add_edge(
        &mut self,
        start: Option<NodeId>,
        end: Option<NodeId>,
        motion: MotionType,
        reverse: bool,
        evidence: Evidence,
    ) -> Result<EdgeId> {
        for id in [start, end].into_iter().flatten() {
            if !self.contains_node(id) {
                return Err(Error::NodeNotFound(id));
            }
        }

        let id = self.next_edge_id();
        if let Some(start) = start {
            self.node_mut(start)?.edges.push(id);
        }
        self.edges.insert(
            id,
            Edge {
                id,
                start,
                end,
                reverse,
                motion,
                evidence,
            },
        );
        Ok(id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    /// Edges in creation order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Set the end of an edge (closing an open edge).
    pub fn set_edge_end(&mut self, id: EdgeId, end: Option<NodeId>) -> Result<()> {
        if let Some(end) = end {
            if !self.contains_node(end) {
                return Err(Error::NodeNotFound(end));
            }
        }
        let edge = self
            .edges
            .get_mut(&id)
            .ok_or_else(|| Error::GraphInconsistency(format!("edge {} missing", id)))?;
        edge.end = end;
        Ok(())
    }

    /// Outgoing edge of `start` ending at `end` (`None` finds an open edge).
    pub fn find_edge(&self, start: NodeId, end: Option<NodeId>) -> Option<EdgeId> {
        let node = self.find_node_by_id(start).ok()?;
        node.edges
            .iter()
            .copied()
            .find(|eid| self.edges.get(eid).is_some_and(|e| e.end == end))
    }

    /// Delete one edge, unlinking it from its start node.
    pub(crate) fn remove_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.remove(&id)?;
        if let Some(start) = edge.start {
            if let Some(&slot) = self.alias.get(&start) {
                self.nodes[slot].edges.retain(|e| *e != id);
            }
        }
        Some(edge)
    }

    /// Remove the edges between `a` and `b`, in both directions.
    pub fn remove_edge_by_id(&mut self, a: NodeId, b: NodeId) -> Result<()> {
        self.find_node_by_id(a)?;
        self.find_node_by_id(b)?;

        let mut removed = 0;
        for (s, t) in [(a, b), (b, a)] {
            while let Some(eid) = self.find_edge(s, Some(t)) {
                self.remove_edge(eid);
                removed += 1;
            }
        }
        if removed == 0 {
            return Err(Error::EdgeNotFound { start: a, end: b });
        }
        tracing::debug!(%a, %b, removed, "removed edges");
        Ok(())
    }

    fn incoming_edges(&self, id: NodeId) -> Vec<EdgeId> {
        self.edges
            .values()
            .filter(|e| e.end == Some(id))
            .map(|e| e.id)
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Places reachable through one outgoing edge, without repeats.
    pub fn neighbors(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let node = self.find_node_by_id(id)?;
        let mut out = Vec::new();
        for eid in &node.edges {
            if let Some(end) = self.edges.get(eid).and_then(|e| e.end) {
                if !out.contains(&end) {
                    out.push(end);
                }
            }
        }
        Ok(out)
    }

    /// Evidence recorded when the place was first left, used as its
    /// appearance. `None` if no outgoing edge carries features.
    pub fn reference_evidence(&self, id: NodeId) -> Option<&Evidence> {
        let node = self.find_node_by_id(id).ok()?;
        node.edges
            .iter()
            .filter_map(|eid| self.edges.get(eid))
            .map(|e| &e.evidence)
            .find(|ev| !ev.features.is_empty())
    }

    /// Number of outgoing edges of a node.
    pub fn degree(&self, id: NodeId) -> Result<usize> {
        Ok(self.find_node_by_id(id)?.degree())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Exploration
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a place while exploring.
    ///
    /// Closes `current_edge` onto the new place, records the backward sibling
    /// of that edge, and opens a fresh edge out of the new place. Returns the
    /// new place and its open edge.
    pub fn add_new_place(
        &mut self,
        timestamp: i64,
        checkpoint: bool,
        current_edge: Option<EdgeId>,
        motion: MotionType,
        evidence: Evidence,
    ) -> Result<(NodeId, EdgeId)> {
        if let Some(eid) = current_edge {
            if !self.edges.contains_key(&eid) {
                return Err(Error::GraphInconsistency(format!(
                    "current edge {} is not in the graph",
                    eid
                )));
            }
        }

        let id = self.add_node(timestamp, checkpoint);

        if let Some(eid) = current_edge {
            self.set_edge_end(eid, Some(id))?;
            let closed = self.edges.get(&eid).map(|e| (e.start, e.motion));
            if let Some((Some(start), closed_motion)) = closed {
                self.add_edge(
                    Some(id),
                    Some(start),
                    closed_motion.reversed(),
                    true,
                    evidence.clone(),
                )?;
            }
        }

        let open = self.add_edge(Some(id), None, motion, false, evidence)?;
        tracing::debug!(node = %id, edge = %open, "added place");
        Ok((id, open))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Structural Maintenance
    // ─────────────────────────────────────────────────────────────────────────

    /// Fold `drop` into `keep`.
    ///
    /// Edges between the two places disappear. Every other edge touching
    /// `drop` is redirected to `keep`, unless `keep` already has an edge to
    /// (or from) the same place, in which case it is deleted. Label,
    /// checkpoint and timestamp move to `keep` where `keep` lacks them.
    pub fn merge_nodes(&mut self, keep: NodeId, drop: NodeId) -> Result<()> {
        if keep == drop {
            return Err(Error::SelfMerge(keep));
        }
        self.find_node_by_id(keep)?;
        self.find_node_by_id(drop)?;

        let between: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| match (e.start, e.end) {
                (Some(s), Some(t)) => {
                    (s == keep && t == drop) || (s == drop && t == keep) || (s == drop && t == drop)
                }
                _ => false,
            })
            .map(|e| e.id)
            .collect();
        for eid in between {
            self.remove_edge(eid);
        }

        // n -> drop becomes n -> keep
        for eid in self.incoming_edges(drop) {
            let start = self.edges.get(&eid).and_then(|e| e.start);
            let duplicate = start.is_some_and(|s| self.find_edge(s, Some(keep)).is_some());
            if duplicate {
                self.remove_edge(eid);
            } else if let Some(edge) = self.edges.get_mut(&eid) {
                edge.end = Some(keep);
            }
        }

        // drop -> n becomes keep -> n
        let outgoing = self.find_node_by_id(drop)?.edges.clone();
        for eid in outgoing {
            let Some(end) = self.edges.get(&eid).map(|e| e.end) else {
                continue;
            };
            if self.find_edge(keep, end).is_some() {
                self.remove_edge(eid);
            } else {
                if let Some(edge) = self.edges.get_mut(&eid) {
                    edge.start = Some(keep);
                }
                self.node_mut(keep)?.edges.push(eid);
            }
        }

        let dropped = self
            .remove_node_entry(drop)
            .ok_or(Error::NodeNotFound(drop))?;
        let kept = self.node_mut(keep)?;
        kept.checkpoint |= dropped.checkpoint;
        if kept.label.is_none() {
            kept.label = dropped.label;
        }
        if kept.timestamp == 0 {
            kept.timestamp = dropped.timestamp;
        }
        kept.pdf0 += dropped.pdf0;
        kept.pdf1 += dropped.pdf1;

        tracing::debug!(%keep, %drop, "merged places");
        Ok(())
    }

    /// Repeatedly delete places with no neighbors. Returns how many went.
    pub fn remove_singletons(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let singletons: Vec<NodeId> = self
                .nodes
                .iter()
                .filter(|n| {
                    !n.edges
                        .iter()
                        .any(|eid| self.edges.get(eid).is_some_and(|e| e.end.is_some()))
                })
                .map(|n| n.id)
                .collect();
            if singletons.is_empty() {
                break;
            }
            for id in singletons {
                self.remove_node(id);
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "removed singleton places");
        }
        removed
    }

    /// Reassign dense ids `0..n`, oldest place first.
    ///
    /// Returns the old-to-new id mapping.
    pub fn renumber(&mut self) -> HashMap<NodeId, NodeId> {
        let mapping: HashMap<NodeId, NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(slot, n)| (n.id, NodeId::new(slot as u32)))
            .collect();
        let remap = |id: NodeId| mapping.get(&id).copied().unwrap_or(id);

        for node in &mut self.nodes {
            node.id = remap(node.id);
        }
        for edge in self.edges.values_mut() {
            edge.start = edge.start.map(remap);
            edge.end = edge.end.map(remap);
        }
        self.alias = self
            .nodes
            .iter()
            .enumerate()
            .map(|(slot, n)| (n.id, slot))
            .collect();
        self.next_node_id = self.nodes.len() as u32;
        mapping
    }

    /// Give every edge's sibling the complementary motion type.
    ///
    /// Forward edges impose nothing on their sibling. Returns the number of
    /// siblings that changed.
    pub fn enforce_edge_symmetry(&mut self) -> usize {
        let ids: Vec<EdgeId> = self.edges.keys().copied().collect();
        let mut changed = 0;
        for eid in ids {
            let Some((Some(start), Some(end), motion)) =
                self.edges.get(&eid).map(|e| (e.start, e.end, e.motion))
            else {
                continue;
            };
            if motion == MotionType::Forward {
                continue;
            }
            if let Some(sibling) = self.find_edge(end, Some(start)) {
                if let Some(s) = self.edges.get_mut(&sibling) {
                    if s.motion != motion.reversed() {
                        s.motion = motion.reversed();
                        changed += 1;
                    }
                }
            }
        }
        changed
    }

    /// Remove a pass-through place, linking its two neighbors directly.
    pub fn remove_node_by_id(&mut self, id: NodeId) -> Result<()> {
        let degree = self.degree(id)?;
        let neighbors = self.neighbors(id)?;
        if degree != 2 || neighbors.len() != 2 {
            return Err(Error::InvalidMerge(format!(
                "{} has degree {}, only pass-through places can be removed",
                id, degree
            )));
        }

        let (n0, n1) = (neighbors[0], neighbors[1]);
        for (a, b) in [(n0, n1), (n1, n0)] {
            let into: Vec<EdgeId> = self
                .find_node_by_id(a)?
                .edges
                .iter()
                .copied()
                .filter(|eid| self.edges.get(eid).is_some_and(|e| e.end == Some(id)))
                .collect();
            for eid in into {
                if self.find_edge(a, Some(b)).is_some() {
                    self.remove_edge(eid);
                } else if let Some(edge) = self.edges.get_mut(&eid) {
                    edge.end = Some(b);
                }
            }
        }

        self.remove_node(id);
        tracing::info!(node = %id, "removed place");
        Ok(())
    }

    /// Cut shortcut edges around pass-through places.
    ///
    /// For a place of degree 2 whose two neighbors both branch (degree > 2),
    /// the direct edges between the neighbors are removed. Returns the number
    /// of edges deleted.
    pub fn remove_triplets(&mut self) -> usize {
        let mut removed = 0;
        for id in self.node_ids() {
            let Ok(node) = self.find_node_by_id(id) else {
                continue;
            };
            if node.degree() != 2 {
                continue;
            }
            let ends: Vec<Option<NodeId>> = node
                .edges
                .iter()
                .map(|eid| self.edges.get(eid).and_then(|e| e.end))
                .collect();
            let (Some(n0), Some(n1)) = (ends[0], ends[1]) else {
                continue;
            };
            if self.degree(n0).unwrap_or(0) <= 2 || self.degree(n1).unwrap_or(0) <= 2 {
                continue;
            }
            for (a, b) in [(n0, n1), (n1, n0)] {
                if let Some(eid) = self.find_edge(a, Some(b)) {
                    self.remove_edge(eid);
                    removed += 1;
                    tracing::debug!(%a, %b, via = %id, "removed triplet shortcut");
                }
            }
        }
        removed
    }

    /// Zero the belief of every node.
    pub fn clear_belief(&mut self) {
        for node in &mut self.nodes {
            node.pdf0 = 0.0;
            node.pdf1 = 0.0;
        }
    }
}
