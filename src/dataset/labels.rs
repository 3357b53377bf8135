//! YOLO label lines
//!
//! One line per box: `class_id center_x center_y width height`, all four
//! geometry values normalized by the frame size and printed with six
//! decimals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::game::{Detection, Observation};

/// One annotated box in YOLO's normalized format
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelLine {
    pub class_id: u32,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl LabelLine {
    /// Label a detection from a frame of `frame_width` x `frame_height`.
    ///
    /// Box corners are truncated to whole pixels first, matching the
    /// coordinates the anchors are computed from.
    pub fn from_detection(det: &Detection, frame_width: u32, frame_height: u32) -> Self {
        let (x1, y1, x2, y2) = det.bbox.to_pixels();
        let (x1, y1, x2, y2) = (
            f64::from(x1),
            f64::from(y1),
            f64::from(x2),
            f64::from(y2),
        );
        let (w, h) = (f64::from(frame_width), f64::from(frame_height));

        Self {
            class_id: det.class.class_id(),
            center_x: ((x1 + x2) / 2.0) / w,
            center_y: ((y1 + y2) / 2.0) / h,
            width: (x2 - x1) / w,
            height: (y2 - y1) / h,
        }
    }
}

impl fmt::Display for LabelLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.center_x, self.center_y, self.width, self.height
        )
    }
}

/// Error parsing a label line
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Malformed label line: '{0}'")]
pub struct LabelParseError(pub String);

impl FromStr for LabelLine {
    type Err = LabelParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let bad = || LabelParseError(line.to_string());
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [class_id, cx, cy, w, h] = fields.as_slice() else {
            return Err(bad());
        };

        let number = |s: &str| s.parse::<f64>().map_err(|_| bad());
        Ok(Self {
            class_id: class_id.parse().map_err(|_| bad())?,
            center_x: number(*cx)?,
            center_y: number(*cy)?,
            width: number(*w)?,
            height: number(*h)?,
        })
    }
}

/// Label file contents for every accepted detection of an observation
pub fn label_file(observation: &Observation) -> String {
    let (w, h) = observation.frame_size;
    if w == 0 || h == 0 {
        return String::new();
    }

    observation
        .detections
        .iter()
        .map(|det| format!("{}\n", LabelLine::from_detection(det, w, h)))
        .collect()
}
