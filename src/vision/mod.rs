//! Vision and image processing module
//!
//! Handles screen capture, object detection and the reduction of raw
//! detections to a per-frame [`Observation`].

pub mod analyzer;
pub mod capture;
pub mod models;
pub mod overlay;
pub mod simulated;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::game::Observation;

pub use analyzer::DetectionAnalyzer;
pub use capture::{frame_from_raw, parse_corners, parse_point, CaptureRegion};
#[cfg(feature = "desktop")]
pub use capture::ScreenCapture;
#[cfg(feature = "desktop-ml")]
pub use models::OnnxDetector;
pub use overlay::annotate;
pub use simulated::SimulatedGame;

/// One box as reported by a detector, in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: u32,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Something that produces frames of the game region
pub trait FrameSource {
    fn capture(&mut self) -> Result<RgbaImage, VisionError>;
}

/// Object detector over whole frames
pub trait Detector {
    fn infer(&mut self, frame: &RgbaImage) -> Result<Vec<RawDetection>, VisionError>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn capture(&mut self) -> Result<RgbaImage, VisionError> {
        (**self).capture()
    }
}

impl<T: Detector + ?Sized> Detector for Box<T> {
    fn infer(&mut self, frame: &RgbaImage) -> Result<Vec<RawDetection>, VisionError> {
        (**self).infer(frame)
    }
}

/// Output of one sensing cycle
#[derive(Debug, Clone)]
pub struct Sensed {
    pub observation: Observation,
    /// The frame the observation was computed from
    pub frame: Arc<RgbaImage>,
    /// When the capture was started
    pub captured_at: Instant,
}

impl Sensed {
    /// Whether the frame capture started at or after `instant`
    pub fn captured_since(&self, instant: Instant) -> bool {
        self.captured_at >= instant
    }
}

/// Main vision system that turns frames into observations
pub struct VisionSystem {
    /// Frame source
    source: Box<dyn FrameSource + Send>,
    /// Object detector
    detector: Box<dyn Detector + Send>,
    analyzer: DetectionAnalyzer,
    /// Frames processed so far
    frame_count: u64,
}

impl VisionSystem {
    /// Create a new vision system
    pub fn new(source: Box<dyn FrameSource + Send>, detector: Box<dyn Detector + Send>) -> Self {
        Self {
            source,
            detector,
            analyzer: DetectionAnalyzer::new(),
            frame_count: 0,
        }
    }

    /// Vision system backed by a simulated game
    pub fn simulated(game: &SimulatedGame) -> Self {
        Self::new(Box::new(game.frame_source()), Box::new(game.detector()))
    }

    /// Capture a frame, run the detector and analyze the result
    pub fn sense(&mut self, confidence_threshold: f32) -> Result<Sensed, VisionError> {
        let captured_at = Instant::now();
        let frame = self.source.capture()?;
        let raw = self.detector.infer(&frame)?;
        let observation = self
            .analyzer
            .analyze(&raw, confidence_threshold, frame.dimensions());

        self.frame_count += 1;

        Ok(Sensed {
            observation,
            frame: Arc::new(frame),
            captured_at,
        })
    }

    /// Number of frames processed
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// Vision system errors
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Screen capture failed: {0}")]
    Capture(String),
    #[error("Invalid frame data")]
    InvalidFrameData,
    #[error("Failed to load model: {0}")]
    ModelLoadError(String),
    #[error("Model inference failed: {0}")]
    InferenceError(String),
    #[error("Unexpected model output: {0}")]
    UnexpectedOutput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn capture(&mut self) -> Result<RgbaImage, VisionError> {
            Err(VisionError::Capture("display gone".into()))
        }
    }

    struct FixedDetector(Vec<RawDetection>);

    impl Detector for FixedDetector {
        fn infer(&mut self, _frame: &RgbaImage) -> Result<Vec<RawDetection>, VisionError> {
            Ok(self.0.clone())
        }
    }

    struct BlankSource;

    impl FrameSource for BlankSource {
        fn capture(&mut self) -> Result<RgbaImage, VisionError> {
            Ok(RgbaImage::new(400, 800))
        }
    }

    #[test]
    fn test_sense_builds_observation() {
        let detections = vec![
            RawDetection {
                class_id: 0,
                confidence: 0.9,
                x1: 100.0,
                y1: 200.0,
                x2: 140.0,
                y2: 300.0,
            },
            RawDetection {
                class_id: 1,
                confidence: 0.8,
                x1: 200.0,
                y1: 100.0,
                x2: 300.0,
                y2: 180.0,
            },
        ];
        let mut vision = VisionSystem::new(Box::new(BlankSource), Box::new(FixedDetector(detections)));

        let sensed = vision.sense(0.6).unwrap();

        assert!(sensed.observation.valid);
        assert_eq!(sensed.observation.frame_size, (400, 800));
        assert_eq!(sensed.frame.dimensions(), (400, 800));
        assert_eq!(vision.frame_count(), 1);

        // Raising the threshold drops both boxes
        assert!(!vision.sense(0.95).unwrap().observation.valid);
    }

    #[test]
    fn test_captured_at_precedes_detection() {
        struct SlowDetector;

        impl Detector for SlowDetector {
            fn infer(&mut self, _frame: &RgbaImage) -> Result<Vec<RawDetection>, VisionError> {
                std::thread::sleep(std::time::Duration::from_millis(30));
                Ok(Vec::new())
            }
        }

        let mut vision = VisionSystem::new(Box::new(BlankSource), Box::new(SlowDetector));
        let before = Instant::now();
        let sensed = vision.sense(0.6).unwrap();
        let after = Instant::now();

        assert!(sensed.captured_since(before));
        // Stamped when capture began, not when inference finished
        assert!(!sensed.captured_since(after));
    }

    #[test]
    fn test_capture_error_propagates() {
        let mut vision =
            VisionSystem::new(Box::new(FailingSource), Box::new(FixedDetector(Vec::new())));

        assert!(matches!(vision.sense(0.6), Err(VisionError::Capture(_))));
        assert_eq!(vision.frame_count(), 0);
    }
}
