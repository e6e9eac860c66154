//! Localization orchestration and thread management.
//!
//! # Architecture
//!
//! ```text
//! producers ──push──▶ [bounded drop-oldest queue] ──▶ worker thread
//!                                                     │  LocalizationContext
//!                                                     ├─▶ StatusSnapshot (RwLock)
//!                                                     └─▶ StatusEvent channel
//! ```
//!
//! The worker owns every piece of mutable state. Producers never block: a
//! full queue evicts its oldest entry. Within one pass only the newest
//! feature set is handled; control messages are never superseded.
//!
//! # Example
//!
//! ```ignore
//! let orchestrator = Orchestrator::new(Config::default())?;
//! orchestrator.push(Observation::Features { timestamp, features, checkpoint: false })?;
//! let status = orchestrator.snapshot();
//! ```

pub mod messages;
pub mod orchestrator;
pub mod queue;
pub mod shared_state;
pub mod worker;

pub use messages::{Observation, StatusEvent};
pub use orchestrator::Orchestrator;
pub use queue::{ObservationSender, observation_queue};
pub use shared_state::{SharedState, StatusSnapshot};
pub use worker::LocalizationContext;
