//! Hopper - vision-driven auto-player for jump-and-land games
//!
//! This library provides the core functionality for playing a "press, hold,
//! release to jump" game from screen captures: object detection on captured
//! frames, the jump timing state machine, and precisely timed pointer input.
//!
//! ## Timing
//!
//! Every jump goes through two waits measured from the end of the previous
//! jump. The first lets the scene settle before any detection is trusted; the
//! second separates locking the jump distance from pressing. See
//! [`game::JumpController`].
//!
//! ## Simulation
//!
//! The `vision::simulated` module provides a synthetic game so the whole
//! pipeline can run without screen or input access.

pub mod config;
pub mod dataset;
pub mod game;
pub mod input;
pub mod runtime;
pub mod vision;

pub use config::{OperatorCommand, Settings, SharedParameters, TimingParameters};
pub use game::{JumpController, JumpPlan, Observation, ScreenPoint};
pub use runtime::{Session, SessionError, SessionStatus};
pub use vision::{CaptureRegion, VisionSystem};
