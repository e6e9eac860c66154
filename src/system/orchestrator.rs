//! Orchestrator - owns the localization worker thread.
//!
//! Producers push [`Observation`]s through a bounded drop-oldest queue; a
//! single worker thread owns all localization state and publishes a
//! [`StatusSnapshot`] plus [`StatusEvent`]s after every pass.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, unbounded};

use crate::config::Config;

use super::messages::{Observation, StatusEvent};
use super::queue::{ObservationSender, observation_queue};
use super::shared_state::{SharedState, StatusSnapshot};
use super::worker::LocalizationContext;

/// Top-level handle on a running localization core.
pub struct Orchestrator {
    /// Published status and the shutdown flag.
    shared: Arc<SharedState>,

    /// Producer end of the observation queue.
    sender: ObservationSender,

    /// Notifications from the worker.
    events: Receiver<StatusEvent>,

    /// The worker hands its state back when it exits.
    handle: Option<JoinHandle<LocalizationContext>>,

    /// Worker state after shutdown.
    context: Option<LocalizationContext>,
}

impl Orchestrator {
    /// Start with an empty map.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_context(LocalizationContext::new(config))
    }

    /// Start the worker on existing state (e.g. a loaded map).
    pub fn with_context(context: LocalizationContext) -> Result<Self> {
        let shared = SharedState::new();
        let capacity = context.config().system.queue_capacity;
        let (sender, receiver) = observation_queue(capacity, shared.clone());
        let (event_tx, events) = unbounded();

        shared.publish(context.snapshot());
        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("localization".into())
            .spawn(move || {
                let mut context = context;
                context.run(receiver, worker_shared, event_tx);
                context
            })
            .context("failed to spawn localization worker")?;

        tracing::info!(capacity, "orchestrator started");
        Ok(Self {
            shared,
            sender,
            events,
            handle: Some(handle),
            context: None,
        })
    }

    /// A producer handle that can be moved to other threads.
    pub fn sender(&self) -> ObservationSender {
        self.sender.clone()
    }

    /// Enqueue an observation. Never blocks.
    pub fn push(&self, observation: Observation) -> Result<()> {
        self.sender.push(observation)
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn events(&self) -> &Receiver<StatusEvent> {
        &self.events
    }

    /// Latest published status.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.shared.snapshot()
    }

    /// Stop the worker after it has handled what is already queued.
    pub fn shutdown(&mut self) -> Result<()> {
        self.shared.request_shutdown();
        if let Some(handle) = self.handle.take() {
            let context = handle
                .join()
                .map_err(|_| anyhow!("localization worker panicked"))?;
            self.context = Some(context);
        }
        Ok(())
    }

    /// Shut down and take the final worker state.
    pub fn into_context(mut self) -> Result<LocalizationContext> {
        self.shutdown()?;
        self.context
            .take()
            .ok_or_else(|| anyhow!("localization worker state already taken"))
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, "orchestrator shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::graph::NodeId;
    use crate::system::worker::tests::{eager_config, features};

    const WAIT: Duration = Duration::from_secs(5);

    fn push_and_wait(orchestrator: &Orchestrator, observation: Observation) -> StatusEvent {
        orchestrator.push(observation).unwrap();
        orchestrator.events().recv_timeout(WAIT).unwrap()
    }

    #[test]
    fn test_places_created_through_worker() {
        let orchestrator = Orchestrator::new(eager_config()).unwrap();
        for k in 0..3 {
            let event = push_and_wait(&orchestrator, features(k as i64 * 1_000_000, k));
            assert_eq!(event, StatusEvent::NodeCreated { node: NodeId::new(k as u32) });
        }

        let context = orchestrator.into_context().unwrap();
        assert_eq!(context.graph().node_count(), 3);
        assert_eq!(context.matrix().size(), 3);
    }

    #[test]
    fn test_snapshot_published_after_pass() {
        let orchestrator = Orchestrator::new(eager_config()).unwrap();
        push_and_wait(&orchestrator, features(0, 0));
        push_and_wait(&orchestrator, features(1_000_000, 1));

        // the snapshot is published right after the events of a pass
        let mut snapshot = orchestrator.snapshot();
        for _ in 0..50 {
            if snapshot.nodes == 2 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
            snapshot = orchestrator.snapshot();
        }
        assert_eq!(snapshot.nodes, 2);
        assert_eq!(snapshot.current_node, Some(NodeId::new(1)));
        assert_eq!(snapshot.processed, 2);
    }

    #[test]
    fn test_rejected_observation_reported() {
        let orchestrator = Orchestrator::new(eager_config()).unwrap();
        let event = push_and_wait(
            &orchestrator,
            Observation::InitBelief {
                node: NodeId::new(42),
            },
        );
        assert!(matches!(event, StatusEvent::ObservationRejected { .. }));
    }

    #[test]
    fn test_shutdown_handles_queued_work() {
        let mut orchestrator = Orchestrator::new(eager_config()).unwrap();
        let sender = orchestrator.sender();
        sender.push(features(0, 0)).unwrap();
        orchestrator.shutdown().unwrap();
        assert!(sender.push(features(1, 1)).is_err());

        let context = orchestrator.into_context().unwrap();
        assert_eq!(context.graph().node_count(), 1);
    }
}
