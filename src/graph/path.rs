//! Path queries over the place graph.
//!
//! Paths are ordered lists of [`EdgeId`]s. Every traversal has unit cost
//! today, so Dijkstra degenerates to breadth-first order, but the heap is
//! kept so weighted edges can be introduced without touching callers.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::error::Result;

use super::place_graph::PlaceGraph;
use super::types::{EdgeId, MotionType, NodeId};

/// Cost of traversing one edge.
const EDGE_WEIGHT: u32 = 1;

/// Timestamp gaps beyond this are treated as recording pauses (µs).
const MAX_EDGE_GAP_US: i64 = 20_000_000;

/// Duration substituted for a recording pause (µs).
const PAUSED_EDGE_US: i64 = 2_000_000;

/// Walking speed used for distance estimates (m/s).
const WALKING_SPEED: f64 = 1.0;

impl PlaceGraph {
    /// Shortest path from `src` to `dst` as an ordered edge list.
    ///
    /// Empty when `src == dst` or when `dst` is unreachable. Fails with
    /// `NodeNotFound` if either endpoint is absent.
    pub fn shortest_path(&self, src: NodeId, dst: NodeId) -> Result<Vec<EdgeId>> {
        self.find_node_by_id(src)?;
        self.find_node_by_id(dst)?;
        if src == dst {
            return Ok(Vec::new());
        }

        let mut dist: HashMap<NodeId, u32> = HashMap::new();
        let mut previous: HashMap<NodeId, EdgeId> = HashMap::new();
        let mut heap = BinaryHeap::new();
        dist.insert(src, 0);
        heap.push(Reverse((0u32, src)));

        while let Some(Reverse((d, id))) = heap.pop() {
            if id == dst {
                break;
            }
            if dist.get(&id).is_some_and(|&best| d > best) {
                continue;
            }
            for &eid in self.find_node_by_id(id)?.edges() {
                let Some(next) = self.edge(eid).and_then(|e| e.end) else {
                    continue;
                };
                let candidate = d + EDGE_WEIGHT;
                if dist.get(&next).is_none_or(|&best| candidate < best) {
                    dist.insert(next, candidate);
                    previous.insert(next, eid);
                    heap.push(Reverse((candidate, next)));
                }
            }
        }

        let mut path = Vec::new();
        let mut cursor = dst;
        while cursor != src {
            let Some(&eid) = previous.get(&cursor) else {
                return Ok(Vec::new());
            };
            path.push(eid);
            cursor = match self.edge(eid).and_then(|e| e.start) {
                Some(start) => start,
                None => return Ok(Vec::new()),
            };
        }
        path.reverse();
        Ok(path)
    }

    /// Places within `radius` hops of `root`, with their hop depth.
    ///
    /// Breadth-first over outgoing edges; `root` comes first at depth 0 and
    /// every place appears once, at its smallest depth.
    pub fn expand_tree(&self, root: NodeId, radius: usize) -> Result<Vec<(NodeId, usize)>> {
        self.find_node_by_id(root)?;

        let mut seen = HashSet::from([root]);
        let mut out = vec![(root, 0)];
        let mut queue = VecDeque::from([(root, 0usize)]);
        while let Some((id, depth)) = queue.pop_front() {
            if depth == radius {
                continue;
            }
            for next in self.neighbors(id)? {
                if seen.insert(next) {
                    out.push((next, depth + 1));
                    queue.push_back((next, depth + 1));
                }
            }
        }
        Ok(out)
    }

    /// Time needed to walk an edge, in seconds. Open edges take no time.
    pub fn edge_time_length(&self, id: EdgeId) -> f64 {
        let Some(edge) = self.edge(id) else {
            return 0.0;
        };
        let (Some(start), Some(end)) = (edge.start, edge.end) else {
            return 0.0;
        };
        let (Ok(a), Ok(b)) = (self.find_node_by_id(start), self.find_node_by_id(end)) else {
            return 0.0;
        };
        let mut dt = (a.timestamp - b.timestamp).abs();
        if dt > MAX_EDGE_GAP_US {
            dt = PAUSED_EDGE_US;
        }
        dt as f64 / 1e6
    }

    /// Estimated (seconds, meters) needed to walk a path.
    pub fn integrate_time_distance(&self, path: &[EdgeId]) -> (f64, f64) {
        let secs: f64 = path.iter().map(|&eid| self.edge_time_length(eid)).sum();
        (secs, secs * WALKING_SPEED)
    }

    /// Motion types of up to `count` edges found between `min_depth` and
    /// `max_depth` hops ahead on `path`.
    pub fn future_directions(
        &self,
        path: &[EdgeId],
        min_depth: usize,
        max_depth: usize,
        count: usize,
    ) -> Vec<MotionType> {
        let mut out = Vec::with_capacity(count);
        for (depth, &eid) in path.iter().enumerate() {
            if depth >= max_depth || out.len() >= count {
                break;
            }
            let Some(edge) = self.edge(eid) else {
                continue;
            };
            if edge.start.is_some() && depth >= min_depth {
                out.push(edge.motion);
            }
        }
        out
    }
}
