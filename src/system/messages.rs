//! Messages into and out of the localization worker.

use std::path::PathBuf;

use crate::features::FeatureSet;
use crate::graph::NodeId;

/// Input to the localization worker.
///
/// Feature sets arrive at camera rate and may be superseded by newer ones
/// before the worker gets to them; control messages are always handled in
/// arrival order.
#[derive(Debug, Clone)]
pub enum Observation {
    /// A fresh feature set.
    Features {
        /// Capture time in microseconds.
        timestamp: i64,
        features: FeatureSet,
        /// Mark the place created from this observation (if any) as a checkpoint.
        checkpoint: bool,
    },

    /// Plan a path from the current place to `destination`.
    RequestPath { destination: NodeId },

    /// Reset the belief onto a known place.
    InitBelief { node: NodeId },

    /// Persist the map (and its similarity matrix next to it).
    SaveMap { path: PathBuf },

    /// Run batch loop closure over the whole history.
    RecomputeLoopClosure,
}

impl Observation {
    pub fn is_features(&self) -> bool {
        matches!(self, Self::Features { .. })
    }
}

/// Notifications for the status-publication layer.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    NodeCreated { node: NodeId },
    Arrived { destination: NodeId },
    MapSaved { path: PathBuf },
    LoopClosureApplied { components: usize, merged: usize, places: usize },
    /// The observation failed and was dropped; state is unchanged.
    ObservationRejected { reason: String },
}
