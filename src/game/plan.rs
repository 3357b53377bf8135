//! Locked jump parameters
//!
//! A [`JumpPlan`] freezes the distance, the factor in effect at lock time and
//! the press duration derived from them. Once created it is never recomputed.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shortest press the controller will ever issue (seconds)
pub const MIN_PRESS_SECONDS: f64 = 0.05;

/// Longest press the controller will ever issue (seconds)
pub const MAX_PRESS_SECONDS: f64 = 3.0;

/// Convert a distance into a press duration, clamped to
/// [`MIN_PRESS_SECONDS`, `MAX_PRESS_SECONDS`]
pub fn press_duration(distance: f64, factor: f64) -> f64 {
    let raw = distance * factor;
    if !raw.is_finite() {
        return MIN_PRESS_SECONDS;
    }
    raw.clamp(MIN_PRESS_SECONDS, MAX_PRESS_SECONDS)
}

/// Frozen distance/factor/duration for one jump
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "LockInputs")]
pub struct JumpPlan {
    /// Actor-to-target distance in pixels at lock time
    distance: f64,
    /// Seconds of press per pixel, snapshotted at lock time
    factor: f64,
    /// Clamped press duration in seconds
    duration: f64,
}

impl JumpPlan {
    /// Lock a plan for the given distance and factor
    pub fn lock(distance: f64, factor: f64) -> Self {
        Self {
            distance,
            factor,
            duration: press_duration(distance, factor),
        }
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Press duration in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Press duration as a [`Duration`]
    pub fn hold(&self) -> Duration {
        Duration::from_secs_f64(self.duration)
    }
}

/// What a serialized plan is rebuilt from; any stored duration is ignored
#[derive(Deserialize)]
struct LockInputs {
    distance: f64,
    factor: f64,
}

impl From<LockInputs> for JumpPlan {
    fn from(inputs: LockInputs) -> Self {
        Self::lock(inputs.distance, inputs.factor)
    }
}
