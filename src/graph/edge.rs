//! Edge (traversal) storage.

use crate::features::Evidence;

use super::types::{EdgeId, MotionType, NodeId};

/// A directed traversal between two places.
///
/// Either endpoint may be `None` while the edge is being recorded: the
/// exploration loop keeps one open edge `current → None` until the next
/// place is created.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub start: Option<NodeId>,
    pub end: Option<NodeId>,

    /// True for the sibling edge created when closing an edge, i.e. the
    /// traversal recorded backwards.
    pub reverse: bool,

    pub motion: MotionType,

    /// Reference features and blobs, owned by the edge.
    pub evidence: Evidence,
}

impl Edge {
    /// True when both endpoints are set.
    pub fn is_closed(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    /// True if this edge touches `id` at either end.
    pub fn touches(&self, id: NodeId) -> bool {
        self.start == Some(id) || self.end == Some(id)
    }
}
