//! Play session: the sensing and decision loops
//!
//! Two named threads share a latest-wins mailbox. The sensing loop captures,
//! detects and publishes observations, skipping any frame that overlapped a
//! press. The decision loop ticks the [`JumpController`] and runs the actuator
//! when a locked plan falls due. It ignores observations whose capture began
//! before the current stabilization window, so a slow detector can never hand
//! it a frame of the actor in flight.

use image::RgbaImage;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::Mailbox;
use crate::config::{CadenceSettings, ConfigError, Settings, SharedParameters, TimingParameters};
use crate::game::{
    ActingFlag, Decision, JumpController, JumpPhase, JumpPlan, JumpStatus, Observation,
    ScreenPoint, SessionStats,
};
use crate::input::Actuator;
use crate::vision::{annotate, Sensed, VisionError, VisionSystem};

/// Data handed to the lock hook
#[derive(Debug, Clone)]
pub struct LockEvent {
    pub plan: JumpPlan,
    /// The observation the plan was locked from
    pub observation: Observation,
    /// The frame that observation was computed from
    pub frame: Arc<RgbaImage>,
    /// When that frame's capture started
    pub captured_at: Instant,
}

/// Callback for plan locks
pub type LockCallback = Arc<dyn Fn(&LockEvent) + Send + Sync>;

/// Snapshot of a session for display
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Whether the loops are alive
    pub running: bool,
    /// Whether play is active
    pub playing: bool,
    pub phase: JumpPhase,
    pub status: JumpStatus,
    /// Human-readable status line
    pub message: String,
    /// Most recent actor-to-target distance in pixels
    pub current_distance: f64,
    /// Press duration the current distance would produce
    pub preview_duration: f64,
    /// The locked plan, if any
    pub plan: Option<JumpPlan>,
    pub stats: SessionStats,
    pub parameters: TimingParameters,
    /// Frames processed by the sensing loop
    pub frames: u64,
    /// Observations replaced before the decision loop consumed them
    pub dropped_observations: u64,
    /// Last sensing error
    pub last_error: Option<String>,
}

impl SessionStatus {
    fn idle(parameters: TimingParameters) -> Self {
        Self {
            running: false,
            playing: false,
            phase: JumpPhase::Idle,
            status: JumpStatus::Stopped,
            message: JumpStatus::Stopped.to_string(),
            current_distance: 0.0,
            preview_duration: 0.0,
            plan: None,
            stats: SessionStats::default(),
            parameters,
            frames: 0,
            dropped_observations: 0,
            last_error: None,
        }
    }

    fn from_controller(controller: &JumpController, parameters: TimingParameters) -> Self {
        Self {
            running: true,
            playing: controller.is_running(),
            phase: controller.phase(),
            status: controller.status().clone(),
            message: controller.status().to_string(),
            current_distance: controller.current_distance(),
            preview_duration: controller.preview_duration(&parameters),
            plan: controller.plan().copied(),
            stats: *controller.stats(),
            parameters,
            frames: 0,
            dropped_observations: 0,
            last_error: None,
        }
    }
}

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No press point: configure a capture region or an explicit press point")]
    NoCaptureRegion,
    #[error("No detector available: {0}")]
    NoDetector(#[from] VisionError),
    #[error("Failed to spawn session thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Session already running")]
    AlreadyRunning,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// State shared between the session handle and its threads
struct Shared {
    /// Loops keep going while set
    alive: AtomicBool,
    /// Desired play state, applied by the decision loop between polls
    play_requested: AtomicBool,
    mailbox: Mailbox<Sensed>,
    status: Mutex<SessionStatus>,
    /// Newest frame and its observation, for previews
    latest: Mutex<Option<(Arc<RgbaImage>, Observation)>>,
    frames: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// A running (or runnable) play session
pub struct Session {
    settings: Settings,
    params: SharedParameters,
    shared: Arc<Shared>,
    on_lock: Option<LockCallback>,
    workers: Vec<JoinHandle<()>>,
}

impl Session {
    /// Create a session. Nothing runs until [`Session::launch`].
    pub fn new(settings: Settings, params: SharedParameters) -> Result<Self, SessionError> {
        settings.validate()?;
        let status = SessionStatus::idle(params.snapshot());

        Ok(Self {
            settings,
            params,
            shared: Arc::new(Shared {
                alive: AtomicBool::new(false),
                play_requested: AtomicBool::new(false),
                mailbox: Mailbox::new(),
                status: Mutex::new(status),
                latest: Mutex::new(None),
                frames: AtomicU64::new(0),
                last_error: Mutex::new(None),
            }),
            on_lock: None,
            workers: Vec::new(),
        })
    }

    /// Register a hook that runs on the decision thread whenever a plan locks
    pub fn on_lock<F>(&mut self, callback: F)
    where
        F: Fn(&LockEvent) + Send + Sync + 'static,
    {
        self.on_lock = Some(Arc::new(callback));
    }

    /// Spawn the sensing and decision loops
    pub fn launch(
        &mut self,
        vision: VisionSystem,
        actuator: Box<dyn Actuator + Send>,
    ) -> Result<(), SessionError> {
        if self.shared.alive.load(Ordering::SeqCst) {
            return Err(SessionError::AlreadyRunning);
        }
        let press_point = self
            .settings
            .press_point()
            .ok_or(SessionError::NoCaptureRegion)?;

        let controller = JumpController::new();
        let acting = controller.acting_flag();
        let cadence = self.settings.cadence;

        self.shared.alive.store(true, Ordering::SeqCst);
        self.shared.status.lock().running = true;

        let sensing = {
            let shared = Arc::clone(&self.shared);
            let params = self.params.clone();
            thread::Builder::new()
                .name("hopper-sensing".to_string())
                .spawn(move || run_sensing_loop(shared, params, vision, acting, cadence))
        };
        let sensing = match sensing {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.alive.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };
        self.workers.push(sensing);

        let decision = {
            let shared = Arc::clone(&self.shared);
            let params = self.params.clone();
            let on_lock = self.on_lock.clone();
            thread::Builder::new()
                .name("hopper-decision".to_string())
                .spawn(move || {
                    run_decision_loop(
                        shared,
                        params,
                        controller,
                        actuator,
                        press_point,
                        on_lock,
                        cadence,
                    )
                })
        };
        match decision {
            Ok(handle) => self.workers.push(handle),
            Err(e) => {
                self.shutdown();
                return Err(e.into());
            }
        }

        log::info!(
            "Session launched (press point ({}, {}))",
            press_point.x,
            press_point.y
        );
        Ok(())
    }

    /// Begin playing; takes effect on the next decision poll
    pub fn start_play(&self) {
        self.shared.play_requested.store(true, Ordering::SeqCst);
        log::info!("Play requested");
    }

    /// Stop playing; takes effect on the next decision poll
    pub fn stop_play(&self) {
        self.shared.play_requested.store(false, Ordering::SeqCst);
        log::info!("Stop requested");
    }

    /// Stop both loops and wait for them to exit
    pub fn shutdown(&mut self) {
        self.shared.play_requested.store(false, Ordering::SeqCst);
        self.shared.alive.store(false, Ordering::SeqCst);

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Session thread panicked");
            }
        }

        let mut status = self.shared.status.lock();
        status.running = false;
        status.playing = false;
        log::info!("Session shut down");
    }

    /// Whether the loops are alive
    pub fn is_running(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Current status snapshot
    pub fn status(&self) -> SessionStatus {
        let mut status = self.shared.status.lock().clone();
        status.frames = self.shared.frames.load(Ordering::Relaxed);
        status.dropped_observations = self.shared.mailbox.dropped();
        status.last_error = self.shared.last_error.lock().clone();
        status
    }

    /// Live parameter handle
    pub fn parameters(&self) -> &SharedParameters {
        &self.params
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Newest frame annotated with its observation
    pub fn latest_preview(&self) -> Option<RgbaImage> {
        let latest = self.shared.latest.lock().clone();
        latest.map(|(frame, observation)| annotate(&frame, &observation))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
        }
    }
}

fn run_sensing_loop(
    shared: Arc<Shared>,
    params: SharedParameters,
    mut vision: VisionSystem,
    acting: ActingFlag,
    cadence: CadenceSettings,
) {
    let interval = Duration::from_millis(cadence.sensing_interval_ms);
    let retry = Duration::from_millis(cadence.capture_retry_ms);
    log::debug!("Sensing loop started");

    while shared.alive.load(Ordering::SeqCst) {
        let acting_at_capture = acting.is_engaged();
        match vision.sense(params.confidence_threshold()) {
            Ok(sensed) => {
                shared.frames.fetch_add(1, Ordering::Relaxed);
                *shared.latest.lock() =
                    Some((Arc::clone(&sensed.frame), sensed.observation.clone()));

                // Frames captured mid-press show the actor in flight
                if !acting_at_capture && !acting.is_engaged() {
                    shared.mailbox.publish(sensed);
                }
                thread::sleep(interval);
            }
            Err(e) => {
                log::warn!("Sensing failed: {}", e);
                *shared.last_error.lock() = Some(e.to_string());
                thread::sleep(retry);
            }
        }
    }

    log::debug!("Sensing loop exited after {} frames", vision.frame_count());
}

fn run_decision_loop(
    shared: Arc<Shared>,
    params: SharedParameters,
    mut controller: JumpController,
    mut actuator: Box<dyn Actuator + Send>,
    press_point: ScreenPoint,
    on_lock: Option<LockCallback>,
    cadence: CadenceSettings,
) {
    let interval = Duration::from_millis(cadence.decision_interval_ms);
    let backoff = Duration::from_millis(cadence.error_backoff_ms);
    log::debug!("Decision loop started");

    while shared.alive.load(Ordering::SeqCst) {
        let wants_play = shared.play_requested.load(Ordering::SeqCst);
        if wants_play && !controller.is_running() {
            shared.mailbox.clear();
            controller.start(Instant::now());
        } else if !wants_play && controller.is_running() {
            controller.stop();
        }

        let timing = params.snapshot();
        let sensed = shared.mailbox.take().filter(|sensed| {
            let fresh = match controller.reference_time() {
                Some(reference) => sensed.captured_since(reference),
                None => true,
            };
            if !fresh {
                log::debug!("Ignoring observation captured before the last jump ended");
            }
            fresh
        });
        let decision = controller.tick(
            Instant::now(),
            sensed.as_ref().map(|s| &s.observation),
            &timing,
        );

        match decision {
            Decision::Lock(plan) => {
                if let (Some(callback), Some(sensed)) = (&on_lock, &sensed) {
                    callback(&LockEvent {
                        plan,
                        observation: sensed.observation.clone(),
                        frame: Arc::clone(&sensed.frame),
                        captured_at: sensed.captured_at,
                    });
                }
            }
            Decision::Fire(plan) => {
                *shared.status.lock() = SessionStatus {
                    status: JumpStatus::Acting { plan },
                    message: JumpStatus::Acting { plan }.to_string(),
                    phase: JumpPhase::Acting,
                    ..SessionStatus::from_controller(&controller, timing)
                };

                let outcome = controller.fire(actuator.as_mut(), press_point, Instant::now);
                // Anything published before the flag went up predates the jump
                shared.mailbox.clear();

                if let Some(Err(_)) = outcome {
                    publish_status(&shared, &controller, timing);
                    thread::sleep(backoff);
                    continue;
                }
            }
            Decision::Stopped | Decision::Wait => {}
        }

        publish_status(&shared, &controller, timing);
        thread::sleep(interval);
    }

    controller.stop();
    publish_status(&shared, &controller, params.snapshot());
    log::debug!("Decision loop exited");
}

fn publish_status(shared: &Shared, controller: &JumpController, timing: TimingParameters) {
    let mut status = SessionStatus::from_controller(controller, timing);
    status.running = shared.alive.load(Ordering::SeqCst);
    *shared.status.lock() = status;
}
