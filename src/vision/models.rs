//! YOLOv8 model support
//!
//! Pre- and post-processing live here as plain `ndarray` code so they work in
//! every build. The ONNX session wrapper needs the `desktop-ml` feature.

use image::imageops::FilterType;
use image::RgbaImage;
use ndarray::{Array4, ArrayViewD};

use super::{RawDetection, VisionError};
use crate::config::DetectorSettings;

/// Resize a frame to the square model input and lay it out as NCHW,
/// RGB scaled to `[0, 1]`
pub fn preprocess(frame: &RgbaImage, input_size: u32) -> Array4<f32> {
    let resized = image::imageops::resize(frame, input_size, input_size, FilterType::Triangle);
    let size = input_size as usize;
    let mut input = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        input[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
        input[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
        input[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
    }

    input
}

/// Decode a `[1, 4 + classes, boxes]` output tensor.
///
/// Box centers and sizes are in model input pixels and get rescaled to the
/// frame, then clamped to it. Candidates under `min_confidence` are skipped.
pub fn decode(
    output: ArrayViewD<'_, f32>,
    frame_size: (u32, u32),
    input_size: u32,
    min_confidence: f32,
) -> Result<Vec<RawDetection>, VisionError> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
        return Err(VisionError::UnexpectedOutput(format!("{:?}", shape)));
    }

    let num_classes = shape[1] - 4;
    let num_boxes = shape[2];
    let scale_x = frame_size.0 as f32 / input_size as f32;
    let scale_y = frame_size.1 as f32 / input_size as f32;
    let (max_x, max_y) = (frame_size.0 as f32, frame_size.1 as f32);

    let mut detections = Vec::new();
    for i in 0..num_boxes {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for c in 0..num_classes {
            let score = output[[0, 4 + c, i]];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        if best_score.is_nan() || best_score < min_confidence {
            continue;
        }

        let cx = output[[0, 0, i]] * scale_x;
        let cy = output[[0, 1, i]] * scale_y;
        let half_w = output[[0, 2, i]] * scale_x / 2.0;
        let half_h = output[[0, 3, i]] * scale_y / 2.0;

        detections.push(RawDetection {
            class_id: best_class as u32,
            confidence: best_score,
            x1: (cx - half_w).clamp(0.0, max_x),
            y1: (cy - half_h).clamp(0.0, max_y),
            x2: (cx + half_w).clamp(0.0, max_x),
            y2: (cy + half_h).clamp(0.0, max_y),
        });
    }

    Ok(detections)
}

/// Intersection over union of two boxes
pub fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let intersection = ix * iy;

    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Greedy per-class non-max suppression, most confident first
pub fn non_max_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == det.class_id && iou(k, &det) > iou_threshold);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

/// YOLOv8 detector running on ONNX Runtime
#[cfg(feature = "desktop-ml")]
pub struct OnnxDetector {
    session: ort::session::Session,
    settings: DetectorSettings,
}

#[cfg(feature = "desktop-ml")]
impl OnnxDetector {
    /// Load the model named in the settings
    pub fn load(settings: &DetectorSettings) -> Result<Self, VisionError> {
        use ort::session::builder::GraphOptimizationLevel;
        use ort::session::Session;

        let path = settings
            .model_path
            .as_ref()
            .ok_or_else(|| VisionError::ModelLoadError("no model path configured".into()))?;

        if !path.exists() {
            return Err(VisionError::ModelLoadError(format!(
                "model not found: {}",
                path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| VisionError::ModelLoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VisionError::ModelLoadError(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| VisionError::ModelLoadError(format!("{}: {}", path.display(), e)))?;

        log::info!("Loaded detector model {}", path.display());

        Ok(Self {
            session,
            settings: settings.clone(),
        })
    }
}

#[cfg(feature = "desktop-ml")]
impl super::Detector for OnnxDetector {
    fn infer(&mut self, frame: &RgbaImage) -> Result<Vec<RawDetection>, VisionError> {
        use ort::value::TensorRef;

        let input = preprocess(frame, self.settings.input_size);
        let tensor = TensorRef::from_array_view(&input)
            .map_err(|e| VisionError::InferenceError(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| VisionError::InferenceError(e.to_string()))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| VisionError::UnexpectedOutput(e.to_string()))?
            .into_owned();
        drop(outputs);

        let candidates = decode(
            output.view(),
            frame.dimensions(),
            self.settings.input_size,
            self.settings.min_confidence,
        )?;
        Ok(non_max_suppression(candidates, self.settings.iou_threshold))
    }
}

/// Error returned when a model is requested from a build without a model runtime
#[cfg(not(feature = "desktop-ml"))]
pub fn runtime_unavailable(settings: &DetectorSettings) -> VisionError {
    VisionError::ModelLoadError(match &settings.model_path {
        Some(path) => format!(
            "cannot load {}: built without the desktop-ml feature",
            path.display()
        ),
        None => "no model path configured and built without the desktop-ml feature".into(),
    })
}
