//! Decides when exploration has moved far enough to map a new place.

use std::collections::VecDeque;

use crate::config::NodeTriggerConfig;

/// Sliding mean of psi-distances to the current place.
#[derive(Debug, Clone)]
pub struct NodeTrigger {
    config: NodeTriggerConfig,
    window: VecDeque<f64>,
    last_fire_us: Option<i64>,
}

impl NodeTrigger {
    pub fn new(config: NodeTriggerConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.window),
            config,
            last_fire_us: None,
        }
    }

    /// Record one psi-distance seen at `timestamp_us`.
    ///
    /// Fires once the window is full, its mean exceeds `psi_threshold` and
    /// `min_interval_secs` have passed since the last firing. Firing empties
    /// the window.
    pub fn push(&mut self, psi: f64, timestamp_us: i64) -> bool {
        if self.window.len() == self.config.window.max(1) {
            self.window.pop_front();
        }
        self.window.push_back(psi);

        if self.window.len() < self.config.window.max(1) {
            return false;
        }
        let mean = self.mean();
        if mean <= self.config.psi_threshold {
            return false;
        }
        let min_interval_us = (self.config.min_interval_secs * 1e6) as i64;
        if self
            .last_fire_us
            .is_some_and(|last| timestamp_us - last < min_interval_us)
        {
            return false;
        }

        tracing::debug!(mean, "new place triggered");
        self.window.clear();
        self.last_fire_us = Some(timestamp_us);
        true
    }

    /// Force the next place to be created at `timestamp_us`.
    pub fn mark(&mut self, timestamp_us: i64) {
        self.window.clear();
        self.last_fire_us = Some(timestamp_us);
    }

    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.last_fire_us = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger() -> NodeTrigger {
        NodeTrigger::new(NodeTriggerConfig {
            window: 3,
            psi_threshold: 0.8,
            min_interval_secs: 1.0,
        })
    }

    #[test]
    fn test_fires_on_full_window_above_threshold() {
        let mut t = trigger();
        assert!(!t.push(0.9, 0));
        assert!(!t.push(0.9, 100_000));
        assert!(t.push(0.9, 200_000));
        // window emptied
        assert_eq!(t.mean(), 0.0);
    }

    #[test]
    fn test_low_mean_does_not_fire() {
        let mut t = trigger();
        for k in 0..10 {
            assert!(!t.push(0.5, k * 1_000_000));
        }
        // one dissimilar frame does not lift the mean enough
        assert!(!t.push(1.0, 20_000_000));
    }

    #[test]
    fn test_min_interval() {
        let mut t = trigger();
        t.mark(0);
        for k in 0..3 {
            assert!(!t.push(1.0, 100_000 * k));
        }
        // interval elapsed, window still full of high values
        assert!(t.push(1.0, 1_500_000));
    }
}
