//! Jump counters

use serde::{Deserialize, Serialize};

use crate::input::PressReport;

/// Timing error above which a press is reported as imprecise (milliseconds)
pub const TIMING_WARN_MS: f64 = 10.0;

/// Counters for one play session
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Plans locked
    pub locks: u64,
    /// Presses that completed
    pub presses: u64,
    /// Presses that failed
    pub failures: u64,
    /// Presses whose timing error exceeded [`TIMING_WARN_MS`]
    pub imprecise_presses: u64,
    /// Requested hold of the most recent press (seconds)
    pub last_planned: Option<f64>,
    /// Measured hold of the most recent press (seconds)
    pub last_actual: Option<f64>,
}

impl SessionStats {
    /// Record a completed press
    pub fn record_press(&mut self, report: &PressReport) {
        self.presses += 1;
        self.last_planned = Some(report.requested.as_secs_f64());
        self.last_actual = Some(report.actual.as_secs_f64());
        if report.error_ms() > TIMING_WARN_MS {
            self.imprecise_presses += 1;
        }
    }

    /// Record a failed press
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Total presses attempted
    pub fn attempts(&self) -> u64 {
        self.presses + self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_record_press() {
        let mut stats = SessionStats::default();
        stats.record_press(&PressReport {
            requested: Duration::from_millis(800),
            actual: Duration::from_millis(803),
        });
        stats.record_press(&PressReport {
            requested: Duration::from_millis(800),
            actual: Duration::from_millis(830),
        });
        stats.record_failure();

        assert_eq!(stats.presses, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.attempts(), 3);
        assert_eq!(stats.imprecise_presses, 1);
        assert_eq!(stats.last_actual, Some(0.83));
    }
}
