//! Path-following state machine.

use crate::error::Result;
use crate::graph::{EdgeId, MotionType, NodeId, PlaceGraph};

/// Where the guidance loop stands.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NavigationState {
    /// No destination.
    #[default]
    Idle,
    /// Walking `path` towards `destination`; `current_edge` is being traversed.
    Following {
        destination: NodeId,
        path: Vec<EdgeId>,
        current_edge: EdgeId,
    },
    /// Reached `destination`. Stays here until the next request.
    Arrived { destination: NodeId },
}

impl NavigationState {
    /// Plan from `from` to `destination`.
    ///
    /// Already being there means `Arrived`; an unreachable destination
    /// leaves the machine `Idle`.
    pub fn request(graph: &PlaceGraph, from: NodeId, destination: NodeId) -> Result<Self> {
        graph.find_node_by_id(destination)?;
        if from == destination {
            return Ok(Self::Arrived { destination });
        }
        let path = graph.shortest_path(from, destination)?;
        let Some(&current_edge) = path.first() else {
            tracing::warn!(%from, %destination, "destination unreachable");
            return Ok(Self::Idle);
        };
        tracing::info!(%from, %destination, hops = path.len(), "following path");
        Ok(Self::Following {
            destination,
            path,
            current_edge,
        })
    }

    /// Advance with the latest belief maximum. Returns true on arrival.
    pub fn update(&mut self, graph: &PlaceGraph, max: NodeId) -> Result<bool> {
        let Self::Following {
            destination,
            path,
            current_edge,
        } = self
        else {
            return Ok(false);
        };

        if max == *destination {
            tracing::info!(destination = %max, "arrived");
            *self = Self::Arrived { destination: max };
            return Ok(true);
        }

        let on_path = path
            .iter()
            .copied()
            .find(|&eid| graph.edge(eid).is_some_and(|e| e.start == Some(max)));
        let remaining = graph.shortest_path(max, *destination)?;
        if let Some(&first) = remaining.first() {
            *current_edge = on_path.unwrap_or(first);
            *path = remaining;
        } else {
            tracing::debug!(%max, "no path from belief maximum, keeping plan");
        }
        Ok(false)
    }

    pub fn current_edge(&self) -> Option<EdgeId> {
        match self {
            Self::Following { current_edge, .. } => Some(*current_edge),
            _ => None,
        }
    }

    pub fn path(&self) -> &[EdgeId] {
        match self {
            Self::Following { path, .. } => path,
            _ => &[],
        }
    }

    pub fn destination(&self) -> Option<NodeId> {
        match self {
            Self::Following { destination, .. } | Self::Arrived { destination } => Some(*destination),
            Self::Idle => None,
        }
    }

    /// Estimated (seconds, meters) left, while following.
    pub fn eta(&self, graph: &PlaceGraph) -> Option<(f64, f64)> {
        match self {
            Self::Following { path, .. } => Some(graph.integrate_time_distance(path)),
            _ => None,
        }
    }

    /// Upcoming turns, while following.
    pub fn future_directions(&self, graph: &PlaceGraph, min_depth: usize, max_depth: usize, count: usize) -> Vec<MotionType> {
        graph.future_directions(self.path(), min_depth, max_depth, count)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Following { .. } => "following",
            Self::Arrived { .. } => "arrived",
        }
    }
}
