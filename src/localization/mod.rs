//! Localization against the place graph.
//!
//! - [`BeliefEstimator`]: transition and observation updates on node beliefs
//! - [`NavigationState`]: path following driven by the belief maximum
//! - [`NodeTrigger`]: new-place decisions while exploring

pub mod belief;
pub mod navigation;
pub mod node_trigger;

pub use belief::BeliefEstimator;
pub use navigation::NavigationState;
pub use node_trigger::NodeTrigger;
