//! Detection analysis
//!
//! Turns the raw detector output for one frame into an [`Observation`].

use crate::game::{BoundingBox, Detection, DetectionClass, Observation, Target};

use super::RawDetection;

/// Selects the actor and the landing target from raw detections
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionAnalyzer;

impl DetectionAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze one frame's detections.
    ///
    /// Boxes below `threshold` and boxes of unknown classes are dropped. The
    /// actor is the most confident actor box; the target is the platform whose
    /// anchor is highest on screen. Ties go to the box seen first.
    pub fn analyze(
        &self,
        raw: &[RawDetection],
        threshold: f32,
        frame_size: (u32, u32),
    ) -> Observation {
        let detections: Vec<Detection> = raw
            .iter()
            .filter(|r| r.confidence >= threshold)
            .filter_map(|r| {
                let class = DetectionClass::from_class_id(r.class_id)?;
                Some(Detection::new(
                    class,
                    r.confidence,
                    BoundingBox::new(r.x1, r.y1, r.x2, r.y2),
                ))
            })
            .collect();

        let actor = select_actor(&detections);
        let platform = select_platform(&detections);

        log::debug!(
            "{} of {} boxes accepted, actor: {}, platform: {}",
            detections.len(),
            raw.len(),
            actor.is_some(),
            platform.is_some()
        );

        Observation::new(actor, platform, detections, frame_size)
    }
}

fn select_actor(detections: &[Detection]) -> Option<Target> {
    let mut best: Option<&Detection> = None;
    for det in detections.iter().filter(|d| d.class == DetectionClass::Actor) {
        match best {
            Some(current) if det.confidence <= current.confidence => {}
            _ => best = Some(det),
        }
    }
    best.copied().map(Target::from_detection)
}

fn select_platform(detections: &[Detection]) -> Option<Target> {
    let mut best: Option<Target> = None;
    for det in detections.iter().filter(|d| d.class == DetectionClass::Platform) {
        let candidate = Target::from_detection(*det);
        match &best {
            Some(current) if candidate.anchor.y >= current.anchor.y => {}
            _ => best = Some(candidate),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ScreenPoint;

    fn raw(class_id: u32, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            x1,
            y1,
            x2,
            y2,
        }
    }

    #[test]
    fn test_basic_selection_and_distance() {
        let analyzer = DetectionAnalyzer::new();
        let boxes = [
            raw(0, 0.9, 100.0, 200.0, 140.0, 300.0),
            raw(1, 0.8, 200.0, 100.0, 300.0, 180.0),
        ];

        let obs = analyzer.analyze(&boxes, 0.6, (400, 800));

        assert!(obs.valid);
        assert_eq!(obs.actor.unwrap().anchor, ScreenPoint::new(120, 297));
        assert_eq!(obs.platform.unwrap().anchor, ScreenPoint::new(250, 120));
        let expected = (130.0f64 * 130.0 + 177.0 * 177.0).sqrt();
        assert!((obs.distance - expected).abs() < 1e-9);
    }

    #[test]
    fn test_topmost_platform_wins() {
        let analyzer = DetectionAnalyzer::new();
        let boxes = [
            raw(0, 0.9, 0.0, 0.0, 40.0, 403.0),
            raw(1, 0.95, 0.0, 300.0, 100.0, 380.0),
            raw(1, 0.7, 200.0, 100.0, 300.0, 180.0),
            raw(1, 0.99, 50.0, 250.0, 150.0, 330.0),
        ];

        let obs = analyzer.analyze(&boxes, 0.6, (400, 800));
        assert_eq!(obs.platform.unwrap().anchor, ScreenPoint::new(250, 120));
    }

    #[test]
    fn test_most_confident_actor_wins_first_on_tie() {
        let analyzer = DetectionAnalyzer::new();
        let boxes = [
            raw(0, 0.7, 0.0, 0.0, 10.0, 10.0),
            raw(0, 0.9, 100.0, 0.0, 110.0, 10.0),
            raw(0, 0.9, 200.0, 0.0, 210.0, 10.0),
        ];

        let obs = analyzer.analyze(&boxes, 0.5, (400, 800));
        assert_eq!(obs.actor.unwrap().anchor.x, 105);
    }

    #[test]
    fn test_platform_tie_keeps_first() {
        let analyzer = DetectionAnalyzer::new();
        let boxes = [
            raw(1, 0.8, 0.0, 100.0, 100.0, 180.0),
            raw(1, 0.8, 200.0, 100.0, 300.0, 180.0),
        ];

        let obs = analyzer.analyze(&boxes, 0.5, (400, 800));
        assert_eq!(obs.platform.unwrap().anchor.x, 50);
    }

    #[test]
    fn test_confidence_gate_is_inclusive() {
        let analyzer = DetectionAnalyzer::new();
        let boxes = [
            raw(0, 0.6, 0.0, 0.0, 40.0, 103.0),
            raw(1, 0.59, 200.0, 100.0, 300.0, 180.0),
        ];

        let obs = analyzer.analyze(&boxes, 0.6, (400, 800));
        assert!(obs.actor.is_some());
        assert!(obs.platform.is_none());
        assert!(!obs.valid);
        assert_eq!(obs.distance, 0.0);
        assert_eq!(obs.detections.len(), 1);
    }

    #[test]
    fn test_unknown_class_ignored() {
        let analyzer = DetectionAnalyzer::new();
        let boxes = [raw(5, 0.99, 0.0, 0.0, 40.0, 40.0)];

        let obs = analyzer.analyze(&boxes, 0.1, (400, 800));
        assert!(obs.detections.is_empty());
        assert!(!obs.valid);
    }

    #[test]
    fn test_empty_frame() {
        let obs = DetectionAnalyzer::new().analyze(&[], 0.6, (400, 800));
        assert_eq!(obs, Observation::empty((400, 800)));
    }
}
