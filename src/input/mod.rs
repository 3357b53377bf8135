//! Pointer input
//!
//! The jump itself is a single press-hold-release at a fixed screen point.
//! [`PointerBackend`] is the raw injection primitive, [`Actuator`] the timed
//! gesture built on top of it.

pub mod actuator;
#[cfg(feature = "desktop")]
pub mod desktop;

use std::time::Duration;

use crate::game::ScreenPoint;

pub use actuator::{precise_sleep, PressActuator};
#[cfg(feature = "desktop")]
pub use desktop::EnigoPointer;

/// Raw mouse button injection
pub trait PointerBackend {
    /// Move to `point` and press the primary button
    fn mouse_down(&mut self, point: ScreenPoint) -> Result<(), InputError>;

    /// Release the primary button
    fn mouse_up(&mut self, point: ScreenPoint) -> Result<(), InputError>;
}

impl<B: PointerBackend + ?Sized> PointerBackend for Box<B> {
    fn mouse_down(&mut self, point: ScreenPoint) -> Result<(), InputError> {
        (**self).mouse_down(point)
    }

    fn mouse_up(&mut self, point: ScreenPoint) -> Result<(), InputError> {
        (**self).mouse_up(point)
    }
}

/// A timed press gesture
pub trait Actuator {
    /// Press at `point`, hold for `duration`, release.
    ///
    /// Blocks for the whole hold. There is no way to cancel once the press
    /// has been issued.
    fn press_and_hold(
        &mut self,
        point: ScreenPoint,
        duration: Duration,
    ) -> Result<PressReport, ActuationFailure>;
}

/// Requested vs. measured hold time of a completed press
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressReport {
    /// Hold time that was asked for
    pub requested: Duration,
    /// Wall-clock time from press-down to release
    pub actual: Duration,
}

impl PressReport {
    /// Absolute timing error in milliseconds
    pub fn error_ms(&self) -> f64 {
        (self.actual.as_secs_f64() - self.requested.as_secs_f64()).abs() * 1000.0
    }
}

/// Input injection errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("Input device unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to inject input event: {0}")]
    Injection(String),
}

/// A press gesture that could not be carried out
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActuationFailure {
    #[error("press-down failed: {0}")]
    PressDown(#[source] InputError),
    #[error("release failed after {held:?}: {source}")]
    Release {
        held: Duration,
        #[source]
        source: InputError,
    },
}
