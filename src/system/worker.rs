//! The localization worker.
//!
//! [`LocalizationContext`] owns every piece of mutable localization state:
//! the place graph, the vocabulary, the similarity matrix and the navigation
//! state. It is driven one [`Observation`] at a time, either directly (tests,
//! offline tools) or from its own thread via [`LocalizationContext::run`].
//!
//! # Modes
//!
//! While a path is being followed, each feature set runs a belief update
//! and advances the navigation state. Otherwise the agent is exploring:
//! feature sets feed the [`NodeTrigger`] and, when it fires, become a new
//! place with a new similarity row.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::features::{Evidence, FeatureMatcher, FeatureSet, NearestNeighborMatcher};
use crate::graph::{EdgeId, MotionType, NodeId, PlaceGraph};
use crate::localization::{BeliefEstimator, NavigationState, NodeTrigger};
use crate::maintenance;
use crate::loop_closing::{LoopClosureDetector, SimilarityMatrix};
use crate::vocabulary::{self, InsertOutcome, NaiveVocabulary, TreeVocabulary, Vocabulary};

use super::messages::{Observation, StatusEvent};
use super::shared_state::{SharedState, StatusSnapshot};

/// Timeout for receiving observations. Allows periodic shutdown checks.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Turn directions published while following a path.
const LOOKAHEAD_MIN_DEPTH: usize = 0;
const LOOKAHEAD_MAX_DEPTH: usize = 5;
const LOOKAHEAD_COUNT: usize = 3;

/// All mutable localization state.
pub struct LocalizationContext {
    config: Config,
    graph: PlaceGraph,
    vocabulary: Box<dyn Vocabulary>,
    matcher: Box<dyn FeatureMatcher>,
    matrix: SimilarityMatrix,
    belief: BeliefEstimator,
    trigger: NodeTrigger,
    detector: LoopClosureDetector,
    navigation: NavigationState,

    /// Edge being traversed: the open edge while exploring, the path edge
    /// while following.
    current_edge: Option<EdgeId>,
    last_variance: Option<f64>,
    places_since_recompute: usize,
    processed: u64,
    superseded: u64,
}

impl LocalizationContext {
    pub fn new(config: Config) -> Self {
        Self::with_map(config, PlaceGraph::new(), SimilarityMatrix::new())
    }

    /// Resume from a saved map. The vocabulary starts empty.
    pub fn with_map(config: Config, graph: PlaceGraph, matrix: SimilarityMatrix) -> Self {
        let vocabulary: Box<dyn Vocabulary> = if config.system.tree_vocabulary {
            Box::new(TreeVocabulary::new(config.vocabulary.clone()))
        } else {
            Box::new(NaiveVocabulary::new(config.vocabulary.radius))
        };
        Self {
            belief: BeliefEstimator::new(config.belief.clone()),
            trigger: NodeTrigger::new(config.node_trigger.clone()),
            detector: LoopClosureDetector::new(config.alignment.clone()),
            vocabulary,
            matcher: Box::new(NearestNeighborMatcher::default()),
            navigation: NavigationState::Idle,
            current_edge: None,
            last_variance: None,
            places_since_recompute: 0,
            processed: 0,
            superseded: 0,
            graph,
            matrix,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the psi-distance collaborator.
    pub fn set_matcher(&mut self, matcher: Box<dyn FeatureMatcher>) {
        self.matcher = matcher;
    }

    pub fn graph(&self) -> &PlaceGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut PlaceGraph {
        &mut self.graph
    }

    pub fn matrix(&self) -> &SimilarityMatrix {
        &self.matrix
    }

    pub fn vocabulary(&self) -> &dyn Vocabulary {
        self.vocabulary.as_ref()
    }

    pub fn navigation(&self) -> &NavigationState {
        &self.navigation
    }

    pub fn current_edge(&self) -> Option<EdgeId> {
        self.current_edge
    }

    pub fn into_parts(self) -> (PlaceGraph, SimilarityMatrix) {
        (self.graph, self.matrix)
    }

    /// Best guess of the current place: the belief maximum if there is any
    /// mass, else the start of the edge being traversed.
    pub fn current_place(&self) -> Option<NodeId> {
        self.belief
            .find_maximum(&self.graph)
            .or_else(|| self.current_edge.and_then(|e| self.graph.edge(e)).and_then(|e| e.start))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Thread loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Serve observations until shutdown is requested or the queue closes.
    ///
    /// Everything queued at wake-up is handled as one batch: control
    /// messages in order, and of the feature sets only the newest.
    pub fn run(&mut self, receiver: Receiver<Observation>, shared: Arc<SharedState>, events: Sender<StatusEvent>) {
        tracing::info!(places = self.graph.node_count(), "localization worker started");
        loop {
            if shared.is_shutdown_requested() {
                let pending: Vec<Observation> = receiver.try_iter().collect();
                if !pending.is_empty() {
                    self.handle_batch(pending, &shared, &events);
                }
                break;
            }

            match receiver.recv_timeout(RECV_TIMEOUT) {
                Ok(first) => {
                    let mut batch = vec![first];
                    batch.extend(receiver.try_iter());
                    self.handle_batch(batch, &shared, &events);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::info!(
            processed = self.processed,
            superseded = self.superseded,
            places = self.graph.node_count(),
            "localization worker stopped"
        );
    }

    fn handle_batch(&mut self, batch: Vec<Observation>, shared: &SharedState, events: &Sender<StatusEvent>) {
        let newest_features = batch.iter().rposition(Observation::is_features);
        for (i, observation) in batch.into_iter().enumerate() {
            if observation.is_features() && Some(i) != newest_features {
                self.superseded += 1;
                continue;
            }
            let out = match self.handle(observation) {
                Ok(out) => out,
                Err(e) => {
                    tracing::warn!(error = %e, "observation rejected");
                    vec![StatusEvent::ObservationRejected { reason: e.to_string() }]
                }
            };
            for event in out {
                // nobody listening is fine
                let _ = events.send(event);
            }
        }
        shared.publish(self.snapshot());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // One observation
    // ─────────────────────────────────────────────────────────────────────────

    /// Handle one observation. On error the localization state is unchanged.
    pub fn handle(&mut self, observation: Observation) -> Result<Vec<StatusEvent>> {
        self.processed += 1;
        match observation {
            Observation::Features {
                timestamp,
                features,
                checkpoint,
            } => self.process_features(timestamp, features, checkpoint),
            Observation::RequestPath { destination } => self.request_path(destination),
            Observation::InitBelief { node } => {
                self.belief.init(&mut self.graph, node)?;
                Ok(Vec::new())
            }
            Observation::SaveMap { path } => self.save_map(&path),
            Observation::RecomputeLoopClosure => self.recompute_loop_closure(),
        }
    }

    fn process_features(&mut self, timestamp: i64, features: FeatureSet, checkpoint: bool) -> Result<Vec<StatusEvent>> {
        self.vocabulary.check_dim(features.dim())?;
        if matches!(self.navigation, NavigationState::Following { .. }) {
            self.localize(&features)
        } else {
            self.explore(timestamp, features, checkpoint)
        }
    }

    /// Belief update and path following.
    fn localize(&mut self, features: &FeatureSet) -> Result<Vec<StatusEvent>> {
        let Some(edge) = self.navigation.current_edge() else {
            return Ok(Vec::new());
        };

        let saved: Vec<(NodeId, f64, f64)> = self.graph.nodes().map(|n| (n.id, n.pdf0, n.pdf1)).collect();
        let updated = self.belief.transition_update(&mut self.graph).and_then(|()| {
            self.belief
                .observation_update(&mut self.graph, edge, features, self.matcher.as_ref())
        });
        let variance = match updated {
            Ok(v) => v,
            Err(e) => {
                for (id, pdf0, pdf1) in saved {
                    if let Ok(n) = self.graph.node_mut(id) {
                        n.pdf0 = pdf0;
                        n.pdf1 = pdf1;
                    }
                }
                return Err(e);
            }
        };
        self.last_variance = Some(variance);

        let mut events = Vec::new();
        if let Some(max) = self.belief.find_maximum(&self.graph) {
            if self.navigation.update(&self.graph, max)? {
                if let Some(destination) = self.navigation.destination() {
                    events.push(StatusEvent::Arrived { destination });
                }
            }
        }
        if let Some(edge) = self.navigation.current_edge() {
            self.current_edge = Some(edge);
        }
        Ok(events)
    }

    /// New-place detection while exploring.
    fn explore(&mut self, timestamp: i64, features: FeatureSet, checkpoint: bool) -> Result<Vec<StatusEvent>> {
        self.resume_exploration()?;
        let current = self
            .current_edge
            .and_then(|e| self.graph.edge(e))
            .and_then(|e| e.start);
        let Some(current) = current else {
            return self.add_place(timestamp, features, checkpoint);
        };

        let psi = match self.graph.reference_evidence(current) {
            Some(ev) => self.matcher.psi_distance(&features, &ev.features)?,
            None => 1.0,
        };
        if self.trigger.push(psi, timestamp) || checkpoint {
            self.add_place(timestamp, features, checkpoint)
        } else {
            tracing::debug!(place = %current, psi, "still at current place");
            Ok(Vec::new())
        }
    }

    /// Make sure exploration continues on an open edge.
    ///
    /// After following a path the current edge is a closed path edge; the
    /// walk then continues out of the current place.
    fn resume_exploration(&mut self) -> Result<()> {
        let open = self
            .current_edge
            .and_then(|e| self.graph.edge(e))
            .is_some_and(|e| !e.is_closed());
        if open {
            return Ok(());
        }
        let Some(place) = self.current_place() else {
            self.current_edge = None;
            return Ok(());
        };
        let edge = match self.graph.find_edge(place, None) {
            Some(edge) => edge,
            None => {
                let evidence = self.graph.reference_evidence(place).cloned().unwrap_or_default();
                self.graph
                    .add_edge(Some(place), None, MotionType::Forward, false, evidence)?
            }
        };
        tracing::debug!(%place, %edge, "resuming exploration");
        self.current_edge = Some(edge);
        Ok(())
    }

    fn add_place(&mut self, timestamp: i64, features: FeatureSet, checkpoint: bool) -> Result<Vec<StatusEvent>> {
        // nothing may change if the vocabulary rejects the features
        self.vocabulary.check_dim(features.dim())?;

        // vote against the vocabulary as it was before this place
        let lookup: Vec<InsertOutcome> = features
            .iter()
            .map(|d| {
                let bags = self.vocabulary.search(d);
                InsertOutcome {
                    matched: !bags.is_empty(),
                    bags,
                }
            })
            .collect();

        let (id, open) = self.graph.add_new_place(
            timestamp,
            checkpoint,
            self.current_edge,
            MotionType::Forward,
            Evidence::from_features(features.clone()),
        )?;
        self.current_edge = Some(open);
        self.trigger.mark(timestamp);

        let mut vote = self
            .vocabulary
            .vote(&vocabulary::matched_bags(&lookup), id.index() + 1);
        let norm = vote.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            let scale = vocabulary::matched_ratio(&lookup) / norm;
            vote.iter_mut().for_each(|v| *v *= scale);
        }
        while self.matrix.size() < id.index() {
            self.matrix.append_row(&[])?;
        }
        self.matrix.append_row(&vote)?;
        self.vocabulary.insert_batch(&features, id)?;

        self.belief.init(&mut self.graph, id)?;
        tracing::info!(place = %id, features = features.len(), words = self.vocabulary.len(), "new place");

        let mut events = vec![StatusEvent::NodeCreated { node: id }];
        self.places_since_recompute += 1;
        let every = self.config.system.recompute_every;
        if every > 0 && self.places_since_recompute >= every {
            events.extend(self.recompute_loop_closure()?);
        }
        Ok(events)
    }

    fn request_path(&mut self, destination: NodeId) -> Result<Vec<StatusEvent>> {
        let from = self
            .current_place()
            .ok_or_else(|| Error::GraphInconsistency("no current place to plan from".into()))?;
        self.navigation = NavigationState::request(&self.graph, from, destination)?;

        if let Some(edge) = self.navigation.current_edge() {
            self.current_edge = Some(edge);
        }
        match self.navigation {
            NavigationState::Arrived { destination } => Ok(vec![StatusEvent::Arrived { destination }]),
            _ => Ok(Vec::new()),
        }
    }

    fn save_map(&mut self, path: &Path) -> Result<Vec<StatusEvent>> {
        maintenance::save_map(path, &self.graph, Some(&self.matrix))?;
        tracing::info!(path = %path.display(), places = self.graph.node_count(), "map saved");
        Ok(vec![StatusEvent::MapSaved {
            path: path.to_path_buf(),
        }])
    }

    /// Batch loop closure, then carry matrix, vocabulary and navigation
    /// across the new ids.
    pub fn recompute_loop_closure(&mut self) -> Result<Vec<StatusEvent>> {
        self.places_since_recompute = 0;
        let report = self.detector.batch_recompute(&mut self.graph, &self.matrix)?;

        let id_map = report.id_map;
        self.matrix = self.matrix.remap(&id_map, self.graph.node_count());
        self.vocabulary.remap_places(&|p: NodeId| {
            id_map
                .get(p.index())
                .copied()
                .flatten()
                .map(|i| NodeId::new(i as u32))
        });

        if self.current_edge.is_some_and(|e| self.graph.edge(e).is_none()) {
            self.current_edge = None;
        }
        let remap = |id: NodeId| id_map.get(id.index()).copied().flatten().map(|i| NodeId::new(i as u32));
        self.navigation = match std::mem::take(&mut self.navigation) {
            NavigationState::Following { destination, .. } => match (remap(destination), self.current_place()) {
                (Some(destination), Some(from)) => NavigationState::request(&self.graph, from, destination)?,
                _ => NavigationState::Idle,
            },
            NavigationState::Arrived { destination } => match remap(destination) {
                Some(destination) => NavigationState::Arrived { destination },
                None => NavigationState::Idle,
            },
            NavigationState::Idle => NavigationState::Idle,
        };
        if let Some(edge) = self.navigation.current_edge() {
            self.current_edge = Some(edge);
        }

        Ok(vec![StatusEvent::LoopClosureApplied {
            components: report.components.len(),
            merged: report.merge.merged,
            places: self.graph.node_count(),
        }])
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            belief: self.belief.belief(&self.graph),
            current_node: self.current_place(),
            current_edge: self.current_edge,
            path: self.navigation.path().to_vec(),
            navigation: self.navigation.clone(),
            directions: self.navigation.future_directions(
                &self.graph,
                LOOKAHEAD_MIN_DEPTH,
                LOOKAHEAD_MAX_DEPTH,
                LOOKAHEAD_COUNT,
            ),
            eta: self.navigation.eta(&self.graph),
            variance: self.last_variance,
            nodes: self.graph.node_count(),
            edges: self.graph.edge_count(),
            processed: self.processed,
            superseded: self.superseded,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::NodeTriggerConfig;

    pub(crate) const DIM: usize = 16;

    /// Appearance of spot `k` along a route: a handful of descriptors that
    /// only spot `k` produces.
    pub(crate) fn spot(k: usize) -> FeatureSet {
        let descriptors: Vec<Vec<f32>> = (0..4)
            .map(|f| {
                let mut d = vec![0.0f32; DIM];
                d[(k * 4 + f) % DIM] = 1.0;
                d[(k * 7 + f * 3 + 1) % DIM] += 0.5;
                let norm = d.iter().map(|x| x * x).sum::<f32>().sqrt();
                d.iter().map(|x| x / norm).collect()
            })
            .collect();
        FeatureSet::from_descriptors(DIM, &descriptors).unwrap()
    }

    pub(crate) fn eager_config() -> Config {
        Config {
            node_trigger: NodeTriggerConfig {
                window: 1,
                psi_threshold: 0.5,
                min_interval_secs: 0.0,
            },
            ..Config::default()
        }
    }

    pub(crate) fn features(timestamp: i64, k: usize) -> Observation {
        Observation::Features {
            timestamp,
            features: spot(k),
            checkpoint: false,
        }
    }

    /// Drive a fresh context through spots `0..n`, one place each.
    pub(crate) fn explored(n: usize) -> LocalizationContext {
        let mut ctx = LocalizationContext::new(eager_config());
        for k in 0..n {
            let events = ctx.handle(features(k as i64 * 1_000_000, k)).unwrap();
            assert_eq!(events, vec![StatusEvent::NodeCreated { node: NodeId::new(k as u32) }]);
        }
        ctx
    }

    #[test]
    fn test_exploration_builds_chain_and_matrix() {
        let ctx = explored(4);
        assert_eq!(ctx.graph().node_count(), 4);
        assert_eq!(ctx.matrix().size(), 4);
        // every place links both ways to its predecessor, plus one open edge
        assert_eq!(ctx.graph().edge_count(), 3 * 2 + 1);
        let open = ctx.current_edge().unwrap();
        assert_eq!(ctx.graph().edge(open).unwrap().start, Some(NodeId::new(3)));
        assert_eq!(ctx.current_place(), Some(NodeId::new(3)));
    }

    #[test]
    fn test_same_view_does_not_create_place() {
        let mut ctx = explored(2);
        let events = ctx.handle(features(5_000_000, 1)).unwrap();
        assert!(events.is_empty());
        assert_eq!(ctx.graph().node_count(), 2);
    }

    #[test]
    fn test_checkpoint_forces_place() {
        let mut ctx = explored(2);
        let events = ctx
            .handle(Observation::Features {
                timestamp: 5_000_000,
                features: spot(1),
                checkpoint: true,
            })
            .unwrap();
        assert_eq!(events, vec![StatusEvent::NodeCreated { node: NodeId::new(2) }]);
        assert!(ctx.graph().find_node_by_id(NodeId::new(2)).unwrap().checkpoint);
    }

    #[test]
    fn test_revisit_votes_for_old_place() {
        let mut ctx = explored(6);
        ctx.handle(features(10_000_000, 1)).unwrap();
        assert_eq!(ctx.matrix().size(), 7);
        let row: Vec<f64> = (0..7).map(|j| ctx.matrix().get(6, j)).collect();
        let best = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(j, _)| j);
        assert_eq!(best, Some(1));
        assert_eq!(row[6], 0.0);
        // every descriptor matched, so the row has unit norm
        let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_features_leave_state_unchanged() {
        let mut ctx = explored(3);
        let edges = ctx.graph().edge_count();
        let bad = FeatureSet::from_descriptors(3, &[vec![1.0, 0.0, 0.0]]).unwrap();
        let err = ctx
            .handle(Observation::Features {
                timestamp: 9_000_000,
                features: bad,
                checkpoint: true,
            })
            .unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
        assert_eq!(ctx.graph().node_count(), 3);
        assert_eq!(ctx.graph().edge_count(), edges);
        assert_eq!(ctx.matrix().size(), 3);
    }

    #[test]
    fn test_follow_path_to_arrival() {
        let mut ctx = explored(6);
        ctx.handle(Observation::InitBelief { node: NodeId::new(0) }).unwrap();
        ctx.handle(Observation::RequestPath {
            destination: NodeId::new(3),
        })
        .unwrap();
        assert!(matches!(ctx.navigation(), NavigationState::Following { .. }));
        assert!(ctx.snapshot().eta.is_some());

        let mut arrived = false;
        for (t, k) in [1usize, 2, 3].into_iter().enumerate() {
            let events = ctx.handle(features(20_000_000 + t as i64, k)).unwrap();
            if events.contains(&StatusEvent::Arrived {
                destination: NodeId::new(3),
            }) {
                arrived = true;
            }
        }
        assert!(arrived);
        assert_eq!(ctx.navigation().name(), "arrived");
        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.current_node, Some(NodeId::new(3)));
        let mass: f64 = snapshot.belief.iter().map(|(_, p)| p).sum();
        assert!((mass - 1.0).abs() < 1e-6);
    }

    /// Matcher that never finds a correspondence.
    struct BlindMatcher;

    impl FeatureMatcher for BlindMatcher {
        fn match_sets(&self, _a: &FeatureSet, _b: &FeatureSet) -> Result<crate::features::MatchSet> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_massless_belief_does_not_arrive() {
        let mut ctx = explored(4);
        ctx.handle(Observation::InitBelief { node: NodeId::new(3) }).unwrap();
        ctx.handle(Observation::RequestPath {
            destination: NodeId::new(0),
        })
        .unwrap();
        assert_eq!(ctx.navigation().name(), "following");

        ctx.set_matcher(Box::new(BlindMatcher));
        let events = ctx.handle(features(20_000_000, 1)).unwrap();
        assert!(events.is_empty());
        assert_eq!(ctx.navigation().name(), "following");
        assert_eq!(ctx.navigation().destination(), Some(NodeId::new(0)));
        let mass: f64 = ctx.snapshot().belief.iter().map(|(_, p)| p).sum();
        assert_eq!(mass, 0.0);
    }

    #[test]
    fn test_recompute_every_place_keeps_first_place() {
        let mut config = eager_config();
        config.system.recompute_every = 1;
        let mut ctx = LocalizationContext::new(config);

        let events = ctx.handle(features(0, 0)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StatusEvent::NodeCreated { node: NodeId::new(0) });
        assert_eq!(ctx.graph().node_count(), 1);
        assert_eq!(ctx.matrix().size(), 1);

        for k in 1..3 {
            let events = ctx.handle(features(k as i64 * 1_000_000, k)).unwrap();
            assert_eq!(events[0], StatusEvent::NodeCreated { node: NodeId::new(k as u32) });
        }
        assert_eq!(ctx.graph().node_count(), 3);
        let open = ctx.current_edge().unwrap();
        assert_eq!(ctx.graph().edge(open).unwrap().start, Some(NodeId::new(2)));
    }

    #[test]
    fn test_exploration_resumes_after_arrival() {
        let mut ctx = explored(4);
        ctx.handle(Observation::InitBelief { node: NodeId::new(3) }).unwrap();
        ctx.handle(Observation::RequestPath {
            destination: NodeId::new(3),
        })
        .unwrap();
        assert_eq!(ctx.navigation().name(), "arrived");

        let events = ctx.handle(features(30_000_000, 6)).unwrap();
        assert_eq!(events, vec![StatusEvent::NodeCreated { node: NodeId::new(4) }]);
        let back = ctx.graph().find_edge(NodeId::new(4), Some(NodeId::new(3)));
        assert!(back.is_some());
    }

    #[test]
    fn test_save_map_writes_graph_and_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.bin");
        let mut ctx = explored(3);
        let events = ctx.handle(Observation::SaveMap { path: path.clone() }).unwrap();
        assert_eq!(events, vec![StatusEvent::MapSaved { path: path.clone() }]);

        let graph = PlaceGraph::load(&path).unwrap();
        assert_eq!(graph.node_count(), 3);
        let matrix = SimilarityMatrix::read(maintenance::similarity_path(&path)).unwrap();
        assert_eq!(&matrix, ctx.matrix());
    }

    #[test]
    fn test_recompute_keeps_state_consistent() {
        let mut ctx = explored(5);
        let events = ctx.handle(Observation::RecomputeLoopClosure).unwrap();
        assert_eq!(
            events,
            vec![StatusEvent::LoopClosureApplied {
                components: 0,
                merged: 0,
                places: 5
            }]
        );
        assert_eq!(ctx.matrix().size(), 5);
        // exploration continues on the same open edge
        ctx.handle(features(9_000_000, 5)).unwrap();
        assert_eq!(ctx.graph().node_count(), 6);
        assert_eq!(ctx.matrix().size(), 6);
    }
}
