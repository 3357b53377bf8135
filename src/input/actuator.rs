//! Press-and-hold gesture with precise timing

use std::thread;
use std::time::{Duration, Instant};

use super::{ActuationFailure, Actuator, PointerBackend, PressReport};
use crate::game::ScreenPoint;

/// Final stretch of a sleep that is busy-waited instead of slept
const SPIN_WINDOW: Duration = Duration::from_millis(2);

/// Sleep for `duration` as accurately as the platform allows.
///
/// The OS sleep covers all but the last [`SPIN_WINDOW`], the remainder is
/// spun so scheduler wakeup latency does not end up in the hold time.
pub fn precise_sleep(duration: Duration) {
    let deadline = Instant::now() + duration;

    if duration > SPIN_WINDOW {
        thread::sleep(duration - SPIN_WINDOW);
    }

    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

/// [`Actuator`] driving a [`PointerBackend`]
pub struct PressActuator<B> {
    backend: B,
}

impl<B: PointerBackend> PressActuator<B> {
    /// Create an actuator over a pointer backend
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Get the underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Consume the actuator and return the backend
    pub fn into_inner(self) -> B {
        self.backend
    }
}

impl<B: PointerBackend> Actuator for PressActuator<B> {
    fn press_and_hold(
        &mut self,
        point: ScreenPoint,
        duration: Duration,
    ) -> Result<PressReport, ActuationFailure> {
        let start = Instant::now();

        if let Err(err) = self.backend.mouse_down(point) {
            // The button may be half-pressed; try to leave it released
            if let Err(release_err) = self.backend.mouse_up(point) {
                log::warn!("Release after failed press also failed: {}", release_err);
            }
            return Err(ActuationFailure::PressDown(err));
        }

        precise_sleep(duration);

        self.backend
            .mouse_up(point)
            .map_err(|source| ActuationFailure::Release {
                held: start.elapsed(),
                source,
            })?;

        Ok(PressReport {
            requested: duration,
            actual: start.elapsed(),
        })
    }
}
