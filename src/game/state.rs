//! Jump timing state machine
//!
//! The controller decides when a distance reading is trusted enough to lock a
//! [`JumpPlan`], when the locked plan is due, and resets itself after the press.
//!
//! ```text
//!   Idle --start--> Sensing --valid obs after stabilize--> Committed
//!                      ^                                       |
//!                      |                         stabilize + commit elapsed
//!                      |                                       v
//!                      +--------------press returns-------- Acting
//! ```
//!
//! All waits are measured from the reference time: the session start, or the
//! completion of the previous press. Time is passed in by the caller so the
//! machine can be driven by simulated ticks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::observation::{Observation, ScreenPoint};
use super::plan::{press_duration, JumpPlan};
use super::stats::{SessionStats, TIMING_WARN_MS};
use crate::config::TimingParameters;
use crate::input::{ActuationFailure, Actuator, PressReport};

/// Controller phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JumpPhase {
    /// Not playing; observations are only displayed
    Idle,
    /// Waiting for the stabilization window and a valid observation
    Sensing,
    /// A plan is locked and waiting for its press time
    Committed,
    /// The press is in progress
    Acting,
}

/// Operator-facing status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JumpStatus {
    /// Not playing
    Stopped,
    /// Stabilized, but no valid actor/platform pair yet
    WaitingForDetection,
    /// Waiting for the scene to settle after the last jump
    Stabilizing { remaining: f64 },
    /// Plan locked, press pending
    Locked { plan: JumpPlan, remaining: f64 },
    /// Press in progress
    Acting { plan: JumpPlan },
    /// Last press finished
    Completed { planned: f64, actual: f64 },
    /// Last press failed
    Failed { reason: String },
}

impl fmt::Display for JumpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JumpStatus::Stopped => write!(f, "stopped"),
            JumpStatus::WaitingForDetection => write!(f, "waiting for actor and platform"),
            JumpStatus::Stabilizing { remaining } => {
                write!(f, "waiting for scene to settle, {:.1}s left", remaining)
            }
            JumpStatus::Locked { plan, remaining } => write!(
                f,
                "locked {:.0}px x {:.5} = {:.3}s, jumping in {:.1}s",
                plan.distance(),
                plan.factor(),
                plan.duration(),
                remaining
            ),
            JumpStatus::Acting { plan } => write!(f, "jumping ({:.3}s press)", plan.duration()),
            JumpStatus::Completed { planned, actual } => {
                write!(f, "jumped: planned {:.3}s, actual {:.3}s", planned, actual)
            }
            JumpStatus::Failed { reason } => write!(f, "jump failed: {}", reason),
        }
    }
}

/// What the decision loop should do after a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Not playing
    Stopped,
    /// Nothing to do this tick
    Wait,
    /// A plan was just locked
    Lock(JumpPlan),
    /// The locked plan is due; call [`JumpController::fire`]
    Fire(JumpPlan),
}

/// The "currently acting" token shared with the sensing loop
#[derive(Debug, Clone, Default)]
pub struct ActingFlag(Arc<AtomicBool>);

impl ActingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a press is in progress
    pub fn is_engaged(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise the flag until the returned guard is dropped
    pub fn engage(&self) -> ActingGuard<'_> {
        self.0.store(true, Ordering::SeqCst);
        ActingGuard { flag: &self.0 }
    }
}

/// Clears the acting flag on drop, including during unwinding
pub struct ActingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ActingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Jump timing controller for one play session
#[derive(Debug)]
pub struct JumpController {
    /// Current phase
    phase: JumpPhase,
    /// The locked plan, present exactly while Committed or Acting
    plan: Option<JumpPlan>,
    /// Start of the current stabilization window
    reference: Option<Instant>,
    /// Raised while the actuator runs
    acting: ActingFlag,
    /// Last status
    status: JumpStatus,
    /// Counters
    stats: SessionStats,
    /// Most recent distance seen outside of a press (display only)
    current_distance: f64,
}

impl JumpController {
    /// Create an idle controller
    pub fn new() -> Self {
        Self {
            phase: JumpPhase::Idle,
            plan: None,
            reference: None,
            acting: ActingFlag::new(),
            status: JumpStatus::Stopped,
            stats: SessionStats::default(),
            current_distance: 0.0,
        }
    }

    /// Begin playing. The first stabilization window starts at `now`.
    pub fn start(&mut self, now: Instant) {
        self.plan = None;
        self.reference = Some(now);
        self.phase = JumpPhase::Sensing;
        self.stats = SessionStats::default();
        self.status = JumpStatus::Stabilizing { remaining: 0.0 };
        log::info!("Jump controller started");
    }

    /// Stop playing and drop any locked plan
    pub fn stop(&mut self) -> Option<JumpPlan> {
        let dropped = self.plan.take();
        if let Some(plan) = &dropped {
            log::info!("Discarding locked plan ({:.3}s press)", plan.duration());
        }
        self.phase = JumpPhase::Idle;
        self.reference = None;
        self.status = JumpStatus::Stopped;
        log::info!("Jump controller stopped");
        dropped
    }

    /// Advance the machine.
    ///
    /// `observation` is the newest unconsumed observation, if any. Timing
    /// parameters are read on every tick; only the factor is frozen, inside
    /// the plan, at lock time.
    pub fn tick(
        &mut self,
        now: Instant,
        observation: Option<&Observation>,
        params: &TimingParameters,
    ) -> Decision {
        let acting = self.acting.is_engaged();

        if let Some(obs) = observation {
            if !acting && self.plan.is_none() {
                self.current_distance = obs.distance;
            }
        }

        let Some(reference) = self.reference else {
            return Decision::Stopped;
        };
        let elapsed = now.saturating_duration_since(reference).as_secs_f64();

        match self.phase {
            JumpPhase::Idle => Decision::Stopped,

            // Presses run to completion inside `fire`; nothing to decide here
            JumpPhase::Acting => Decision::Wait,

            JumpPhase::Sensing => {
                if elapsed < params.stabilize_seconds {
                    self.status = JumpStatus::Stabilizing {
                        remaining: params.stabilize_seconds - elapsed,
                    };
                    return Decision::Wait;
                }

                match observation {
                    Some(obs) if obs.valid && !acting && self.plan.is_none() => {
                        let plan = JumpPlan::lock(obs.distance, params.factor);
                        self.plan = Some(plan);
                        self.phase = JumpPhase::Committed;
                        self.stats.locks += 1;
                        self.status = JumpStatus::Locked {
                            plan,
                            remaining: (params.total_wait() - elapsed).max(0.0),
                        };
                        log::info!(
                            "Locked jump: {:.0}px x {:.5} = {:.3}s (press at +{:.1}s)",
                            plan.distance(),
                            plan.factor(),
                            plan.duration(),
                            params.total_wait()
                        );
                        Decision::Lock(plan)
                    }
                    _ => {
                        self.status = JumpStatus::WaitingForDetection;
                        Decision::Wait
                    }
                }
            }

            JumpPhase::Committed => {
                let Some(plan) = self.plan else {
                    // Unreachable by construction; recover to sensing
                    self.phase = JumpPhase::Sensing;
                    return Decision::Wait;
                };

                let due = params.total_wait();
                if elapsed >= due {
                    Decision::Fire(plan)
                } else {
                    self.status = JumpStatus::Locked {
                        plan,
                        remaining: due - elapsed,
                    };
                    Decision::Wait
                }
            }
        }
    }

    /// Execute the locked plan.
    ///
    /// Returns `None` when no plan is committed. Otherwise the actuator is
    /// invoked exactly once with the locked duration, and whatever it returns,
    /// the plan is cleared, the acting flag lowered and a new stabilization
    /// window started before this returns. `clock` is read once the press has
    /// returned and gives the start of that window.
    pub fn fire<A, C>(
        &mut self,
        actuator: &mut A,
        point: ScreenPoint,
        clock: C,
    ) -> Option<Result<PressReport, ActuationFailure>>
    where
        A: Actuator + ?Sized,
        C: FnOnce() -> Instant,
    {
        let plan = match (self.phase, self.plan) {
            (JumpPhase::Committed, Some(plan)) => plan,
            _ => return None,
        };

        self.phase = JumpPhase::Acting;
        self.status = JumpStatus::Acting { plan };
        log::debug!(
            "Pressing at ({}, {}) for {:.3}s",
            point.x,
            point.y,
            plan.duration()
        );

        let outcome = {
            let _acting = self.acting.engage();
            actuator.press_and_hold(point, plan.hold())
        };

        self.complete(clock(), &outcome);
        Some(outcome)
    }

    fn complete(&mut self, now: Instant, outcome: &Result<PressReport, ActuationFailure>) {
        match outcome {
            Ok(report) => {
                self.stats.record_press(report);
                let error_ms = report.error_ms();
                if error_ms > TIMING_WARN_MS {
                    log::warn!(
                        "Jump timing off by {:.1}ms: planned {:.3}s, actual {:.3}s",
                        error_ms,
                        report.requested.as_secs_f64(),
                        report.actual.as_secs_f64()
                    );
                } else {
                    log::info!(
                        "Jumped: planned {:.3}s, actual {:.3}s ({:.1}ms off)",
                        report.requested.as_secs_f64(),
                        report.actual.as_secs_f64(),
                        error_ms
                    );
                }
                self.status = JumpStatus::Completed {
                    planned: report.requested.as_secs_f64(),
                    actual: report.actual.as_secs_f64(),
                };
            }
            Err(err) => {
                self.stats.record_failure();
                log::error!("Jump failed: {}", err);
                self.status = JumpStatus::Failed {
                    reason: err.to_string(),
                };
            }
        }

        self.plan = None;
        self.reference = Some(now);
        self.phase = JumpPhase::Sensing;
    }

    /// Current phase
    pub fn phase(&self) -> JumpPhase {
        self.phase
    }

    /// The locked plan, if any
    pub fn plan(&self) -> Option<&JumpPlan> {
        self.plan.as_ref()
    }

    /// Whether a plan is locked
    pub fn is_locked(&self) -> bool {
        self.plan.is_some()
    }

    /// Whether the next valid observation may lock a plan
    pub fn accepts_locks(&self) -> bool {
        self.phase == JumpPhase::Sensing && self.plan.is_none() && !self.acting.is_engaged()
    }

    /// Whether the controller is playing
    pub fn is_running(&self) -> bool {
        self.phase != JumpPhase::Idle
    }

    /// Start of the current stabilization window
    pub fn reference_time(&self) -> Option<Instant> {
        self.reference
    }

    /// Last status
    pub fn status(&self) -> &JumpStatus {
        &self.status
    }

    /// Counters
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Handle to the acting flag for the sensing loop
    pub fn acting_flag(&self) -> ActingFlag {
        self.acting.clone()
    }

    /// Most recent distance seen outside a press
    pub fn current_distance(&self) -> f64 {
        self.current_distance
    }

    /// Press duration the current distance would produce, for display
    pub fn preview_duration(&self, params: &TimingParameters) -> f64 {
        match &self.plan {
            Some(plan) => plan.duration(),
            None => press_duration(self.current_distance, params.factor),
        }
    }
}

impl Default for JumpController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::observation::{BoundingBox, Detection, DetectionClass, Target};
    use crate::input::InputError;
    use std::time::Duration;

    /// Observation whose anchors are `distance` pixels apart horizontally
    fn valid_obs(distance: i32) -> Observation {
        let actor = Detection::new(
            DetectionClass::Actor,
            0.9,
            BoundingBox::new(0.0, 0.0, 20.0, 103.0),
        );
        // Platform anchor y = 80 + 80 / 4 = 100, same as the actor's feet
        let x = (10 + distance) as f32;
        let platform = Detection::new(
            DetectionClass::Platform,
            0.9,
            BoundingBox::new(x - 50.0, 80.0, x + 50.0, 160.0),
        );
        Observation::new(
            Some(Target::from_detection(actor)),
            Some(Target::from_detection(platform)),
            vec![actor, platform],
            (1000, 1000),
        )
    }

    fn at(t0: Instant, secs: f64) -> Instant {
        t0 + Duration::from_secs_f64(secs)
    }

    fn params(stabilize: f64, commit: f64) -> TimingParameters {
        TimingParameters {
            factor: 0.004,
            stabilize_seconds: stabilize,
            commit_seconds: commit,
            confidence_threshold: 0.6,
        }
    }

    #[derive(Default)]
    struct MockActuator {
        calls: Vec<(ScreenPoint, Duration)>,
        fail: bool,
        flag: Option<ActingFlag>,
        saw_engaged: Vec<bool>,
    }

    impl Actuator for MockActuator {
        fn press_and_hold(
            &mut self,
            point: ScreenPoint,
            duration: Duration,
        ) -> Result<PressReport, ActuationFailure> {
            self.calls.push((point, duration));
            if let Some(flag) = &self.flag {
                self.saw_engaged.push(flag.is_engaged());
            }
            if self.fail {
                return Err(ActuationFailure::PressDown(InputError::Unavailable(
                    "no device".into(),
                )));
            }
            Ok(PressReport {
                requested: duration,
                actual: duration,
            })
        }
    }

    fn assert_consistent(controller: &JumpController) {
        let locked_phase = matches!(
            controller.phase(),
            JumpPhase::Committed | JumpPhase::Acting
        );
        assert_eq!(controller.is_locked(), locked_phase);
        assert!(!(controller.is_locked() && controller.accepts_locks()));
    }

    #[test]
    fn test_idle_controller_never_locks() {
        let mut controller = JumpController::new();
        let t0 = Instant::now();

        let decision = controller.tick(at(t0, 10.0), Some(&valid_obs(300)), &params(2.0, 1.5));

        assert_eq!(decision, Decision::Stopped);
        assert!(!controller.is_locked());
        assert_eq!(controller.current_distance(), 300.0);
    }

    #[test]
    fn test_two_phase_wait_schedule() {
        let mut controller = JumpController::new();
        let mut actuator = MockActuator::default();
        let p = params(2.0, 1.5);
        let t0 = Instant::now();
        controller.start(t0);

        // Before stabilization: no lock
        assert_eq!(controller.tick(at(t0, 0.5), Some(&valid_obs(300)), &p), Decision::Wait);
        assert!(!controller.is_locked());
        assert!(matches!(controller.status(), JumpStatus::Stabilizing { .. }));

        // First valid observation after stabilization locks
        let locked = match controller.tick(at(t0, 2.1), Some(&valid_obs(300)), &p) {
            Decision::Lock(plan) => plan,
            other => panic!("Expected lock, got {other:?}"),
        };
        assert_eq!(locked.distance(), 300.0);
        assert_eq!(controller.phase(), JumpPhase::Committed);

        // Fresh observations while committed change nothing
        for (t, d) in [(2.4, 900), (2.9, 20), (3.4, 650)] {
            assert_eq!(controller.tick(at(t0, t), Some(&valid_obs(d)), &p), Decision::Wait);
            assert_eq!(controller.plan(), Some(&locked));
            assert_consistent(&controller);
        }

        // Due at reference + 3.5s
        assert_eq!(
            controller.tick(at(t0, 3.5), Some(&valid_obs(5)), &p),
            Decision::Fire(locked)
        );

        let report = controller
            .fire(&mut actuator, ScreenPoint::new(50, 60), || at(t0, 3.6))
            .unwrap()
            .unwrap();

        assert_eq!(actuator.calls.len(), 1);
        assert_eq!(actuator.calls[0], (ScreenPoint::new(50, 60), locked.hold()));
        assert_eq!(report.requested, locked.hold());
        assert!(!controller.is_locked());
        assert_eq!(controller.phase(), JumpPhase::Sensing);
        assert_eq!(controller.reference_time(), Some(at(t0, 3.6)));
        assert!(matches!(controller.status(), JumpStatus::Completed { .. }));
    }

    #[test]
    fn test_fire_due_without_new_observation() {
        let mut controller = JumpController::new();
        let p = params(1.0, 1.0);
        let t0 = Instant::now();
        controller.start(t0);

        assert!(matches!(
            controller.tick(at(t0, 1.2), Some(&valid_obs(100)), &p),
            Decision::Lock(_)
        ));
        assert!(matches!(controller.tick(at(t0, 2.0), None, &p), Decision::Fire(_)));
    }

    #[test]
    fn test_invalid_observation_does_not_lock() {
        let mut controller = JumpController::new();
        let p = params(0.5, 0.5);
        let t0 = Instant::now();
        controller.start(t0);

        let empty = Observation::empty((100, 100));
        assert_eq!(controller.tick(at(t0, 1.0), Some(&empty), &p), Decision::Wait);
        assert_eq!(controller.status(), &JumpStatus::WaitingForDetection);
        assert!(!controller.is_locked());
    }

    #[test]
    fn test_factor_snapshotted_at_lock() {
        let mut controller = JumpController::new();
        let mut p = params(0.0, 1.0);
        let t0 = Instant::now();
        controller.start(t0);

        let plan = match controller.tick(at(t0, 0.1), Some(&valid_obs(250)), &p) {
            Decision::Lock(plan) => plan,
            other => panic!("Expected lock, got {other:?}"),
        };

        p.factor = 0.008;
        match controller.tick(at(t0, 1.1), None, &p) {
            Decision::Fire(fired) => {
                assert_eq!(fired, plan);
                assert!((fired.duration() - 1.0).abs() < 1e-9);
            }
            other => panic!("Expected fire, got {other:?}"),
        }
    }

    #[test]
    fn test_commit_wait_read_every_tick() {
        let mut controller = JumpController::new();
        let mut p = params(1.0, 1.0);
        let t0 = Instant::now();
        controller.start(t0);

        assert!(matches!(
            controller.tick(at(t0, 1.0), Some(&valid_obs(100)), &p),
            Decision::Lock(_)
        ));

        // Operator lengthens the commit wait before the press is due
        p.commit_seconds = 3.0;
        assert_eq!(controller.tick(at(t0, 2.5), None, &p), Decision::Wait);
        assert!(matches!(controller.tick(at(t0, 4.0), None, &p), Decision::Fire(_)));
    }

    #[test]
    fn test_failed_press_unwinds() {
        let mut controller = JumpController::new();
        let mut actuator = MockActuator {
            fail: true,
            ..Default::default()
        };
        let p = params(0.5, 0.5);
        let t0 = Instant::now();
        controller.start(t0);

        controller.tick(at(t0, 0.6), Some(&valid_obs(200)), &p);
        assert!(matches!(controller.tick(at(t0, 1.0), None, &p), Decision::Fire(_)));

        let outcome = controller
            .fire(&mut actuator, ScreenPoint::new(0, 0), || at(t0, 1.1))
            .unwrap();
        assert!(outcome.is_err());

        assert!(!controller.is_locked());
        assert!(!controller.acting_flag().is_engaged());
        assert_eq!(controller.phase(), JumpPhase::Sensing);
        assert!(matches!(controller.status(), JumpStatus::Failed { .. }));
        assert!(controller.status().to_string().contains("no device"));
        assert_eq!(controller.stats().failures, 1);

        // A new plan can lock after the next stabilization window
        assert_eq!(controller.reference_time(), Some(at(t0, 1.1)));
        assert_eq!(
            controller.tick(at(t0, 1.3), Some(&valid_obs(200)), &p),
            Decision::Wait
        );
        assert!(matches!(
            controller.tick(at(t0, 1.7), Some(&valid_obs(120)), &p),
            Decision::Lock(_)
        ));
    }

    #[test]
    fn test_acting_flag_raised_only_during_press() {
        let mut controller = JumpController::new();
        let mut actuator = MockActuator {
            flag: Some(controller.acting_flag()),
            ..Default::default()
        };
        let p = params(0.0, 0.0);
        let t0 = Instant::now();
        controller.start(t0);

        controller.tick(at(t0, 0.0), Some(&valid_obs(100)), &p);
        controller.tick(at(t0, 0.1), None, &p);
        controller.fire(&mut actuator, ScreenPoint::new(0, 0), || at(t0, 0.2));

        assert_eq!(actuator.saw_engaged, vec![true]);
        assert!(!controller.acting_flag().is_engaged());
    }

    #[test]
    fn test_engaged_flag_blocks_locking() {
        let mut controller = JumpController::new();
        let flag = controller.acting_flag();
        let p = params(0.0, 1.0);
        let t0 = Instant::now();
        controller.start(t0);

        {
            let _guard = flag.engage();
            assert_eq!(controller.tick(at(t0, 0.5), Some(&valid_obs(400)), &p), Decision::Wait);
            assert!(!controller.is_locked());
            // Distance readings during a press are not recorded
            assert_eq!(controller.current_distance(), 0.0);
        }

        assert!(matches!(
            controller.tick(at(t0, 0.6), Some(&valid_obs(400)), &p),
            Decision::Lock(_)
        ));
    }

    #[test]
    fn test_stop_clears_plan() {
        let mut controller = JumpController::new();
        let p = params(0.0, 5.0);
        let t0 = Instant::now();
        controller.start(t0);

        controller.tick(at(t0, 0.1), Some(&valid_obs(300)), &p);
        assert!(controller.is_locked());

        let dropped = controller.stop();
        assert!(dropped.is_some());
        assert!(!controller.is_locked());
        assert_eq!(controller.phase(), JumpPhase::Idle);
        assert_eq!(controller.tick(at(t0, 10.0), Some(&valid_obs(300)), &p), Decision::Stopped);

        let mut actuator = MockActuator::default();
        assert!(controller
            .fire(&mut actuator, ScreenPoint::new(0, 0), Instant::now)
            .is_none());
        assert!(actuator.calls.is_empty());
    }

    #[test]
    fn test_fire_without_plan_is_noop() {
        let mut controller = JumpController::new();
        let mut actuator = MockActuator::default();
        controller.start(Instant::now());

        assert!(controller
            .fire(&mut actuator, ScreenPoint::new(0, 0), Instant::now)
            .is_none());
        assert!(actuator.calls.is_empty());
    }

    #[test]
    fn test_one_press_per_lock_over_many_cycles() {
        let mut controller = JumpController::new();
        let mut actuator = MockActuator::default();
        let p = params(0.3, 0.2);
        let mut now = Instant::now();
        controller.start(now);

        let mut locks = Vec::new();
        let mut fires = 0;

        for step in 0..400 {
            now += Duration::from_millis(50);
            // Every third observation is empty, the rest drift in distance
            let obs = if step % 3 == 0 {
                Observation::empty((100, 100))
            } else {
                valid_obs(100 + (step * 7) % 500)
            };

            match controller.tick(now, Some(&obs), &p) {
                Decision::Lock(plan) => locks.push(plan),
                Decision::Fire(plan) => {
                    assert_eq!(Some(&plan), locks.last());
                    controller.fire(&mut actuator, ScreenPoint::new(1, 1), || now);
                    fires += 1;
                    assert_eq!(controller.reference_time(), Some(now));
                }
                _ => {}
            }
            assert_consistent(&controller);
        }

        assert!(fires > 5);
        assert_eq!(actuator.calls.len(), fires);
        assert_eq!(controller.stats().presses as usize, fires);
        assert!(locks.len() == fires || locks.len() == fires + 1);
        for (call, plan) in actuator.calls.iter().zip(&locks) {
            assert_eq!(call.1, plan.hold());
        }
    }

    #[test]
    fn test_preview_duration() {
        let mut controller = JumpController::new();
        let p = params(0.0, 1.0);
        controller.tick(Instant::now(), Some(&valid_obs(10)), &p);
        assert!((controller.preview_duration(&p) - 0.05).abs() < 1e-9);
    }
}
