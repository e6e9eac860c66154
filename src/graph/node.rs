//! Node (place) storage.

use super::types::{EdgeId, NodeId};

/// A mapped place.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique place id.
    pub id: NodeId,

    /// Optional human-readable name ("elevator", "room 32-331").
    pub label: Option<String>,

    /// True if this place is a mission checkpoint.
    pub checkpoint: bool,

    /// Creation time in microseconds (0 when unknown).
    pub timestamp: i64,

    /// Predicted belief after the transition update.
    pub pdf0: f64,

    /// Posterior belief after the observation update.
    pub pdf1: f64,

    /// Outgoing edges (edges whose `start` is this node).
    pub(crate) edges: Vec<EdgeId>,
}

impl Node {
    pub fn new(id: NodeId, timestamp: i64, checkpoint: bool) -> Self {
        Self {
            id,
            label: None,
            checkpoint,
            timestamp,
            pdf0: 0.0,
            pdf1: 0.0,
            edges: Vec::new(),
        }
    }

    /// Outgoing edge ids, in creation order.
    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    /// Number of outgoing edges, open edges included.
    pub fn degree(&self) -> usize {
        self.edges.len()
    }
}
