//! Bounded observation queue with drop-oldest backpressure.

use std::sync::Arc;

use anyhow::{Result, bail};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use super::messages::Observation;
use super::shared_state::SharedState;

/// Producer handle. Never blocks: when the queue is full the oldest pending
/// observation is evicted to make room.
#[derive(Clone)]
pub struct ObservationSender {
    tx: Sender<Observation>,
    /// Used only to evict from the head of the queue.
    evict: Receiver<Observation>,
    shared: Arc<SharedState>,
}

impl ObservationSender {
    pub fn new(tx: Sender<Observation>, evict: Receiver<Observation>, shared: Arc<SharedState>) -> Self {
        Self { tx, evict, shared }
    }

    /// Enqueue an observation, evicting the oldest one if the queue is full.
    pub fn push(&self, observation: Observation) -> Result<()> {
        if self.shared.is_shutdown_requested() {
            bail!("localization worker is shutting down");
        }
        let mut observation = observation;
        loop {
            match self.tx.try_send(observation) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(back)) => {
                    if self.evict.try_recv().is_ok() {
                        self.shared.record_eviction();
                        tracing::warn!(evicted = self.shared.evicted(), "observation queue full, dropped oldest");
                    }
                    observation = back;
                }
                Err(TrySendError::Disconnected(_)) => bail!("localization worker has stopped"),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Bounded queue: the producer handle and the worker's receiving end.
pub fn observation_queue(capacity: usize, shared: Arc<SharedState>) -> (ObservationSender, Receiver<Observation>) {
    let (tx, rx) = bounded(capacity.max(1));
    (ObservationSender::new(tx, rx.clone(), shared), rx)
}
