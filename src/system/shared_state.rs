//! State shared between the localization worker and its readers.
//!
//! The worker owns the graph, vocabulary and belief outright. Readers never
//! touch them; they get a [`StatusSnapshot`] the worker publishes after every
//! pass, behind a `RwLock`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::graph::{EdgeId, MotionType, NodeId};
use crate::localization::NavigationState;

/// Published view of the worker state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    /// `(place, pdf1)` for every place.
    pub belief: Vec<(NodeId, f64)>,
    pub current_node: Option<NodeId>,
    pub current_edge: Option<EdgeId>,
    pub path: Vec<EdgeId>,
    pub navigation: NavigationState,
    /// Next turns while following a path.
    pub directions: Vec<MotionType>,
    /// Remaining (seconds, meters) while following a path.
    pub eta: Option<(f64, f64)>,
    /// Spread returned by the last observation update.
    pub variance: Option<f64>,
    pub nodes: usize,
    pub edges: usize,
    /// Observations handled.
    pub processed: u64,
    /// Feature sets superseded by a newer one before being handled.
    pub superseded: u64,
}

/// Shared between the producer handle, the worker and readers.
pub struct SharedState {
    status: RwLock<StatusSnapshot>,

    /// Observations evicted from the full queue.
    evicted: AtomicU64,

    /// Ask the worker to handle what is queued and exit.
    shutdown_requested: AtomicBool,
}

impl SharedState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Copy of the latest published status.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.read().clone()
    }

    pub fn publish(&self, status: StatusSnapshot) {
        *self.status.write() = status;
    }

    pub fn record_eviction(&self) {
        self.evicted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            status: RwLock::new(StatusSnapshot::default()),
            evicted: AtomicU64::new(0),
            shutdown_requested: AtomicBool::new(false),
        }
    }
}
