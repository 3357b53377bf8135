//! Synthetic jump game for dry runs
//!
//! A tiny world with one actor standing on a platform and one target platform
//! further up the screen. The detector reports noisy boxes for the actor, the
//! platform it stands on and the target; the pointer backend turns hold time
//! into travel distance. Everything shares one world behind a mutex, so the
//! pieces can be handed to different threads like the real backends.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Detector, FrameSource, RawDetection, VisionError};
use crate::game::ScreenPoint;
use crate::input::{InputError, PointerBackend};

/// Hold seconds per pixel of travel in the simulated physics
pub const DEFAULT_TRUE_FACTOR: f64 = 0.00404;

/// Smallest frame the world can be laid out in
const MIN_FRAME: (u32, u32) = (200, 300);

const ACTOR_WIDTH: f32 = 30.0;
const ACTOR_HEIGHT: f32 = 80.0;
const PLATFORM_WIDTH: f32 = 100.0;
const PLATFORM_HEIGHT: f32 = 60.0;
/// Distance from the target anchor that still counts as a landing
const LANDING_TOLERANCE: f64 = 40.0;
/// Box jitter in pixels
const JITTER: f32 = 2.0;
/// Probability that the target is missed by the detector in a frame
const DROPOUT: f64 = 0.1;

#[derive(Debug)]
struct World {
    frame_size: (u32, u32),
    /// Actor contact point
    actor: (f32, f32),
    /// Landing point of the target platform
    target: (f32, f32),
    true_factor: f64,
    rng: StdRng,
    landed: u64,
    missed: u64,
}

impl World {
    fn new(frame_size: (u32, u32), seed: u64, true_factor: f64) -> Self {
        let frame_size = (frame_size.0.max(MIN_FRAME.0), frame_size.1.max(MIN_FRAME.1));
        let mut world = Self {
            frame_size,
            actor: (0.0, 0.0),
            target: (0.0, 0.0),
            true_factor,
            rng: StdRng::seed_from_u64(seed),
            landed: 0,
            missed: 0,
        };
        world.reset_round();
        world
    }

    /// Put the actor back at home and spawn a fresh target above it
    fn reset_round(&mut self) {
        let (w, h) = (self.frame_size.0 as f32, self.frame_size.1 as f32);
        let margin = PLATFORM_WIDTH / 2.0 + 10.0;

        let home_x = self.rng.gen_range(margin..(w - margin));
        let home_y = h * 0.75;
        self.actor = (home_x, home_y);

        let rise = self.rng.gen_range((h * 0.15)..(h * 0.4));
        let target_x = self.rng.gen_range(margin..(w - margin));
        self.target = (target_x, (home_y - rise).max(PLATFORM_HEIGHT));
    }

    /// Move the actor along the line to the target by the distance the hold
    /// time buys
    fn jump(&mut self, held: Duration) {
        let dx = f64::from(self.target.0 - self.actor.0);
        let dy = f64::from(self.target.1 - self.actor.1);
        let full = (dx * dx + dy * dy).sqrt();
        let travel = held.as_secs_f64() / self.true_factor;

        let (ux, uy) = if full > 0.0 {
            (dx / full, dy / full)
        } else {
            (0.0, 0.0)
        };
        let landed_at = (
            f64::from(self.actor.0) + ux * travel,
            f64::from(self.actor.1) + uy * travel,
        );
        let miss = ((landed_at.0 - f64::from(self.target.0)).powi(2)
            + (landed_at.1 - f64::from(self.target.1)).powi(2))
        .sqrt();

        if miss <= LANDING_TOLERANCE {
            self.landed += 1;
            log::debug!("Simulated landing {:.1}px off (held {:?})", miss, held);
        } else {
            self.missed += 1;
            log::debug!("Simulated miss by {:.1}px (held {:?})", miss, held);
        }
        self.reset_round();
    }

    fn jitter(&mut self) -> f32 {
        self.rng.gen_range(-JITTER..=JITTER)
    }

    fn actor_box(&mut self) -> RawDetection {
        let (x, y) = self.actor;
        let j = self.jitter();
        RawDetection {
            class_id: 0,
            confidence: self.rng.gen_range(0.7..0.98),
            x1: x - ACTOR_WIDTH / 2.0 + j,
            y1: y + 3.0 - ACTOR_HEIGHT + j,
            x2: x + ACTOR_WIDTH / 2.0 + j,
            y2: y + 3.0 + j,
        }
    }

    /// Platform box whose anchor sits at `surface`
    fn platform_box(&mut self, surface: (f32, f32)) -> RawDetection {
        let (x, y) = surface;
        let j = self.jitter();
        RawDetection {
            class_id: 1,
            confidence: self.rng.gen_range(0.62..0.97),
            x1: x - PLATFORM_WIDTH / 2.0 + j,
            y1: y - PLATFORM_HEIGHT / 4.0 + j,
            x2: x + PLATFORM_WIDTH / 2.0 + j,
            y2: y + PLATFORM_HEIGHT * 3.0 / 4.0 + j,
        }
    }

    fn detections(&mut self) -> Vec<RawDetection> {
        let mut boxes = Vec::with_capacity(4);
        let ground = self.actor;
        boxes.push(self.platform_box(ground));
        if !self.rng.gen_bool(DROPOUT) {
            let target = self.target;
            boxes.push(self.platform_box(target));
        }
        boxes.push(self.actor_box());

        // An occasional low-confidence ghost the confidence gate should drop
        if self.rng.gen_bool(0.2) {
            let (w, h) = self.frame_size;
            boxes.push(RawDetection {
                class_id: 1,
                confidence: self.rng.gen_range(0.1..0.4),
                x1: 0.0,
                y1: 0.0,
                x2: w as f32 / 4.0,
                y2: h as f32 / 10.0,
            });
        }
        boxes
    }

    fn render(&self) -> RgbaImage {
        let (w, h) = self.frame_size;
        let mut frame = RgbaImage::from_pixel(w, h, Rgba([32, 32, 48, 255]));
        let platform = |(x, y): (f32, f32)| {
            Rect::at(
                (x - PLATFORM_WIDTH / 2.0) as i32,
                (y - PLATFORM_HEIGHT / 4.0) as i32,
            )
            .of_size(PLATFORM_WIDTH as u32, PLATFORM_HEIGHT as u32)
        };
        draw_filled_rect_mut(&mut frame, platform(self.actor), Rgba([120, 120, 140, 255]));
        draw_filled_rect_mut(&mut frame, platform(self.target), Rgba([160, 160, 200, 255]));
        draw_filled_rect_mut(
            &mut frame,
            Rect::at(
                (self.actor.0 - ACTOR_WIDTH / 2.0) as i32,
                (self.actor.1 + 3.0 - ACTOR_HEIGHT) as i32,
            )
            .of_size(ACTOR_WIDTH as u32, ACTOR_HEIGHT as u32),
            Rgba([60, 40, 90, 255]),
        );
        frame
    }
}

/// Handle to a simulated game world
#[derive(Debug, Clone)]
pub struct SimulatedGame {
    world: Arc<Mutex<World>>,
}

impl SimulatedGame {
    /// Create a world for frames of `frame_size`, seeded for reproducibility
    pub fn new(frame_size: (u32, u32), seed: u64) -> Self {
        Self::with_true_factor(frame_size, seed, DEFAULT_TRUE_FACTOR)
    }

    /// Create a world whose physics use a specific hold-per-pixel factor
    pub fn with_true_factor(frame_size: (u32, u32), seed: u64, true_factor: f64) -> Self {
        Self {
            world: Arc::new(Mutex::new(World::new(frame_size, seed, true_factor))),
        }
    }

    pub fn frame_source(&self) -> SimulatedFrames {
        SimulatedFrames {
            world: Arc::clone(&self.world),
        }
    }

    pub fn detector(&self) -> SimulatedDetector {
        SimulatedDetector {
            world: Arc::clone(&self.world),
        }
    }

    pub fn pointer(&self) -> SimulatedPointer {
        SimulatedPointer {
            world: Arc::clone(&self.world),
            pressed_at: None,
        }
    }

    /// Frame size the world is laid out in
    pub fn frame_size(&self) -> (u32, u32) {
        self.world.lock().frame_size
    }

    /// Exact distance between the actor and the target landing point
    pub fn true_distance(&self) -> f64 {
        let world = self.world.lock();
        let dx = f64::from(world.target.0 - world.actor.0);
        let dy = f64::from(world.target.1 - world.actor.1);
        (dx * dx + dy * dy).sqrt()
    }

    /// (landed, missed) jump counts
    pub fn score(&self) -> (u64, u64) {
        let world = self.world.lock();
        (world.landed, world.missed)
    }
}

/// Renders the simulated world
pub struct SimulatedFrames {
    world: Arc<Mutex<World>>,
}

impl FrameSource for SimulatedFrames {
    fn capture(&mut self) -> Result<RgbaImage, VisionError> {
        Ok(self.world.lock().render())
    }
}

/// Reports noisy boxes for the simulated world
pub struct SimulatedDetector {
    world: Arc<Mutex<World>>,
}

impl Detector for SimulatedDetector {
    fn infer(&mut self, _frame: &RgbaImage) -> Result<Vec<RawDetection>, VisionError> {
        Ok(self.world.lock().detections())
    }
}

/// Turns press-and-release pairs into simulated jumps
pub struct SimulatedPointer {
    world: Arc<Mutex<World>>,
    pressed_at: Option<Instant>,
}

impl PointerBackend for SimulatedPointer {
    fn mouse_down(&mut self, _point: ScreenPoint) -> Result<(), InputError> {
        self.pressed_at = Some(Instant::now());
        Ok(())
    }

    fn mouse_up(&mut self, _point: ScreenPoint) -> Result<(), InputError> {
        match self.pressed_at.take() {
            Some(start) => {
                self.world.lock().jump(start.elapsed());
                Ok(())
            }
            None => Err(InputError::Injection("release without press".into())),
        }
    }
}
