//! Per-frame detection results
//!
//! Detections are folded into a single [`Observation`] every sensing cycle:
//! the actor's contact point, the chosen landing target and the distance
//! between them.

use serde::{Deserialize, Serialize};

/// Pixels between the actor box's bottom edge and its contact point
pub const ACTOR_FOOT_OFFSET: i32 = 3;

/// A point in pixel coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

impl ScreenPoint {
    /// Create a new point
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &ScreenPoint) -> f64 {
        let dx = (other.x - self.x) as f64;
        let dy = (other.y - self.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Object classes the detector is trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionClass {
    /// The player-controlled character
    Actor,
    /// A landing platform
    Platform,
}

impl DetectionClass {
    /// Map a model class id (0 = actor, 1 = platform)
    pub fn from_class_id(class_id: u32) -> Option<Self> {
        match class_id {
            0 => Some(DetectionClass::Actor),
            1 => Some(DetectionClass::Platform),
            _ => None,
        }
    }

    /// The model class id of this class
    pub fn class_id(&self) -> u32 {
        match self {
            DetectionClass::Actor => 0,
            DetectionClass::Platform => 1,
        }
    }
}

/// Axis-aligned box in frame pixel coordinates (x1, y1) - (x2, y2)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Box corners truncated to whole pixels
    pub fn to_pixels(&self) -> (i32, i32, i32, i32) {
        (
            self.x1 as i32,
            self.y1 as i32,
            self.x2 as i32,
            self.y2 as i32,
        )
    }
}

/// One labeled, confidence-scored box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Object class
    pub class: DetectionClass,
    /// Detector confidence (0.0-1.0)
    pub confidence: f32,
    /// Bounding box
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class: DetectionClass, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class,
            confidence,
            bbox,
        }
    }

    /// Representative point of this detection
    ///
    /// The actor anchors at its feet (bottom edge, nudged up by
    /// [`ACTOR_FOOT_OFFSET`]). A platform anchors a quarter of the way down
    /// from its top edge, which is where its landing surface sits in the
    /// game's isometric view.
    pub fn anchor(&self) -> ScreenPoint {
        let (x1, y1, x2, y2) = self.bbox.to_pixels();
        let center_x = (x1 + x2).div_euclid(2);

        match self.class {
            DetectionClass::Actor => ScreenPoint::new(center_x, y2 - ACTOR_FOOT_OFFSET),
            DetectionClass::Platform => ScreenPoint::new(center_x, y1 + (y2 - y1).div_euclid(4)),
        }
    }
}

/// A detection selected for jumping, with its anchor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub anchor: ScreenPoint,
    pub detection: Detection,
}

impl Target {
    pub fn from_detection(detection: Detection) -> Self {
        Self {
            anchor: detection.anchor(),
            detection,
        }
    }
}

/// Distilled result of one sensing cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Highest-confidence actor
    pub actor: Option<Target>,
    /// Topmost platform
    pub platform: Option<Target>,
    /// Distance between the two anchors in pixels (0 when not valid)
    pub distance: f64,
    /// Whether both anchors are present
    pub valid: bool,
    /// All detections that passed the confidence gate
    pub detections: Vec<Detection>,
    /// Size of the analyzed frame
    pub frame_size: (u32, u32),
}

impl Observation {
    /// Build an observation from the selected targets
    pub fn new(
        actor: Option<Target>,
        platform: Option<Target>,
        detections: Vec<Detection>,
        frame_size: (u32, u32),
    ) -> Self {
        let (distance, valid) = match (&actor, &platform) {
            (Some(a), Some(p)) => (a.anchor.distance_to(&p.anchor), true),
            _ => (0.0, false),
        };

        Self {
            actor,
            platform,
            distance,
            valid,
            detections,
            frame_size,
        }
    }

    /// An observation with nothing detected
    pub fn empty(frame_size: (u32, u32)) -> Self {
        Self::new(None, None, Vec::new(), frame_size)
    }
}
