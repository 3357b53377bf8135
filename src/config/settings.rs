//! User settings and runtime-adjustable timing parameters
//!
//! Defines all configurable options for a play session.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::ConfigError;
use crate::game::ScreenPoint;
use crate::vision::CaptureRegion;

/// Upper bound for either wait phase (seconds)
pub const MAX_WAIT_SECONDS: f64 = 60.0;

/// Upper bound for the distance factor (seconds per pixel)
pub const MAX_FACTOR: f64 = 1.0;

/// Main settings structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Jump timing parameters
    pub timing: TimingParameters,
    /// Screen region and press point
    pub capture: CaptureSettings,
    /// Loop cadences and backoffs
    pub cadence: CadenceSettings,
    /// Detector model settings
    pub detector: DetectorSettings,
}

impl Settings {
    /// Load settings from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings if the file exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::info!("No settings at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Write settings as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every section against its documented range
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()?;
        self.cadence.validate()?;
        self.detector.validate()?;
        if let Some(region) = self.capture.region {
            if region.width == 0 || region.height == 0 {
                return Err(ConfigError::EmptyRegion);
            }
        }
        Ok(())
    }

    /// Screen point the jump press is issued at
    pub fn press_point(&self) -> Option<ScreenPoint> {
        self.capture
            .press_point
            .or_else(|| self.capture.region.map(|r| r.center()))
    }
}

/// Operator-tunable jump timing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingParameters {
    /// Press seconds per pixel of distance
    pub factor: f64,
    /// Wait after the previous jump before trusting observations (seconds)
    pub stabilize_seconds: f64,
    /// Additional wait between locking a plan and pressing (seconds)
    pub commit_seconds: f64,
    /// Minimum detector confidence for a box to be considered
    pub confidence_threshold: f32,
}

impl Default for TimingParameters {
    fn default() -> Self {
        Self {
            factor: 0.00404,
            stabilize_seconds: 2.0,
            commit_seconds: 1.5,
            confidence_threshold: 0.6,
        }
    }
}

impl TimingParameters {
    /// Total wait from the reference time to the press
    pub fn total_wait(&self) -> f64 {
        self.stabilize_seconds + self.commit_seconds
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("factor", self.factor, 0.0, MAX_FACTOR)?;
        check_range("stabilize_seconds", self.stabilize_seconds, 0.0, MAX_WAIT_SECONDS)?;
        check_range("commit_seconds", self.commit_seconds, 0.0, MAX_WAIT_SECONDS)?;
        check_range(
            "confidence_threshold",
            self.confidence_threshold as f64,
            0.0,
            1.0,
        )?;
        Ok(())
    }
}

fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

/// Shared handle to the live timing parameters.
///
/// The operator side writes through the validating setters; the sensing and
/// decision loops read snapshots. Invalid values never get stored.
#[derive(Debug, Clone, Default)]
pub struct SharedParameters {
    inner: Arc<RwLock<TimingParameters>>,
}

impl SharedParameters {
    /// Wrap validated parameters
    pub fn new(params: TimingParameters) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(params)),
        })
    }

    /// Copy of the current parameters
    pub fn snapshot(&self) -> TimingParameters {
        *self.inner.read()
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.inner.read().confidence_threshold
    }

    /// Replace all parameters at once
    pub fn replace(&self, params: TimingParameters) -> Result<(), ConfigError> {
        params.validate()?;
        *self.inner.write() = params;
        Ok(())
    }

    pub fn set_factor(&self, factor: f64) -> Result<(), ConfigError> {
        self.update(|p| p.factor = factor)
    }

    pub fn set_stabilize_seconds(&self, seconds: f64) -> Result<(), ConfigError> {
        self.update(|p| p.stabilize_seconds = seconds)
    }

    pub fn set_commit_seconds(&self, seconds: f64) -> Result<(), ConfigError> {
        self.update(|p| p.commit_seconds = seconds)
    }

    pub fn set_confidence_threshold(&self, threshold: f32) -> Result<(), ConfigError> {
        self.update(|p| p.confidence_threshold = threshold)
    }

    fn update(&self, change: impl FnOnce(&mut TimingParameters)) -> Result<(), ConfigError> {
        let mut guard = self.inner.write();
        let mut candidate = *guard;
        change(&mut candidate);
        candidate.validate()?;
        *guard = candidate;
        Ok(())
    }
}

/// Where to look and where to press
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Screen rectangle containing the game
    pub region: Option<CaptureRegion>,
    /// Press location (defaults to the region center)
    pub press_point: Option<ScreenPoint>,
}

/// Loop timings (milliseconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceSettings {
    /// Interval between sensing cycles
    pub sensing_interval_ms: u64,
    /// Interval between decision polls
    pub decision_interval_ms: u64,
    /// Delay before retrying a failed capture or inference
    pub capture_retry_ms: u64,
    /// Pause after a failed jump
    pub error_backoff_ms: u64,
}

impl Default for CadenceSettings {
    fn default() -> Self {
        Self {
            sensing_interval_ms: 50,
            decision_interval_ms: 100,
            capture_retry_ms: 100,
            error_backoff_ms: 500,
        }
    }
}

impl CadenceSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensing_interval_ms == 0 || self.decision_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

/// Object detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Path to the ONNX model
    pub model_path: Option<PathBuf>,
    /// Square model input size in pixels
    pub input_size: u32,
    /// Confidence floor applied before non-max suppression
    pub min_confidence: f32,
    /// IoU above which overlapping boxes of one class are merged
    pub iou_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: 640,
            min_confidence: 0.25,
            iou_threshold: 0.45,
        }
    }
}

impl DetectorSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_size == 0 {
            return Err(ConfigError::OutOfRange {
                name: "input_size",
                value: 0.0,
                min: 1.0,
                max: f64::from(u32::MAX),
            });
        }
        check_range("min_confidence", self.min_confidence as f64, 0.0, 1.0)?;
        check_range("iou_threshold", self.iou_threshold as f64, 0.0, 1.0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.timing.factor, 0.00404);
        assert_eq!(settings.timing.stabilize_seconds, 2.0);
        assert_eq!(settings.timing.commit_seconds, 1.5);
        assert_eq!(settings.cadence.sensing_interval_ms, 50);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_total_wait() {
        let timing = TimingParameters::default();
        assert!((timing.total_wait() - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let params = SharedParameters::default();

        assert!(params.set_factor(-0.1).is_err());
        assert!(params.set_factor(f64::NAN).is_err());
        assert!(params.set_commit_seconds(f64::INFINITY).is_err());
        assert!(params.set_confidence_threshold(1.5).is_err());

        // Rejected writes leave the previous values in place
        assert_eq!(params.snapshot(), TimingParameters::default());
    }

    #[test]
    fn test_setters_apply_valid_values() {
        let params = SharedParameters::default();
        params.set_factor(0.005).unwrap();
        params.set_stabilize_seconds(1.0).unwrap();
        params.set_commit_seconds(0.5).unwrap();
        params.set_confidence_threshold(0.4).unwrap();

        let snapshot = params.snapshot();
        assert_eq!(snapshot.factor, 0.005);
        assert_eq!(snapshot.stabilize_seconds, 1.0);
        assert_eq!(snapshot.commit_seconds, 0.5);
        assert_eq!(params.confidence_threshold(), 0.4);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "timing": { "factor": 0.0039 }, "capture": { "region": { "left": 10, "top": 20, "width": 400, "height": 800 } } }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.timing.factor, 0.0039);
        assert_eq!(settings.timing.commit_seconds, 1.5);
        assert_eq!(settings.detector.input_size, 640);
        assert_eq!(settings.press_point(), Some(ScreenPoint::new(210, 420)));
    }

    #[test]
    fn test_explicit_press_point_wins() {
        let mut settings = Settings::default();
        settings.capture.region = Some(CaptureRegion::new(0, 0, 100, 100));
        settings.capture.press_point = Some(ScreenPoint::new(5, 6));
        assert_eq!(settings.press_point(), Some(ScreenPoint::new(5, 6)));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("hopper-settings-{}.json", std::process::id()));
        let mut settings = Settings::default();
        settings.timing.factor = 0.0042;
        settings.capture.region = Some(CaptureRegion::new(1, 2, 300, 600));

        settings.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_invalid_file_values_rejected() {
        let json = r#"{ "timing": { "stabilize_seconds": -1.0 } }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::OutOfRange { name: "stabilize_seconds", .. })
        ));
    }
}
