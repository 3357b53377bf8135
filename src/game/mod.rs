//! Game state and logic module
//!
//! This module contains the jump-game data structures and the timing logic,
//! including detections, observations, jump plans and the controller.

pub mod observation;
pub mod plan;
pub mod state;
pub mod stats;

pub use observation::{BoundingBox, Detection, DetectionClass, Observation, ScreenPoint, Target};
pub use plan::{press_duration, JumpPlan, MAX_PRESS_SECONDS, MIN_PRESS_SECONDS};
pub use state::{ActingFlag, ActingGuard, Decision, JumpController, JumpPhase, JumpStatus};
pub use stats::SessionStats;
