//! Screen capture handling
//!
//! The capture region is the screen rectangle the game is drawn in. Frames
//! are always delivered in region-local pixel coordinates.

use image::{ImageBuffer, RgbaImage};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::VisionError;
use crate::config::ConfigError;
use crate::game::ScreenPoint;

/// Screen rectangle containing the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    /// Left edge in screen pixels
    pub left: i32,
    /// Top edge in screen pixels
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub const fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Build a region from two opposite corners clicked in any order
    pub fn from_corners(a: ScreenPoint, b: ScreenPoint) -> Result<Self, ConfigError> {
        let left = a.x.min(b.x);
        let top = a.y.min(b.y);
        let width = a.x.abs_diff(b.x);
        let height = a.y.abs_diff(b.y);

        if width == 0 || height == 0 {
            return Err(ConfigError::EmptyRegion);
        }
        Ok(Self::new(left, top, width, height))
    }

    /// Center of the region, rounded down
    pub fn center(&self) -> ScreenPoint {
        ScreenPoint::new(
            self.left + (self.width / 2) as i32,
            self.top + (self.height / 2) as i32,
        )
    }
}

/// Parses `left,top,width,height`
impl FromStr for CaptureRegion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [left, top, width, height] = parse_ints::<4>(s)?;
        let width = u32::try_from(width).map_err(|_| ConfigError::InvalidCoordinates(s.into()))?;
        let height =
            u32::try_from(height).map_err(|_| ConfigError::InvalidCoordinates(s.into()))?;
        if width == 0 || height == 0 {
            return Err(ConfigError::EmptyRegion);
        }
        Ok(Self::new(left, top, width, height))
    }
}

/// Parse `x1,y1,x2,y2` as two opposite corners
pub fn parse_corners(s: &str) -> Result<CaptureRegion, ConfigError> {
    let [x1, y1, x2, y2] = parse_ints::<4>(s)?;
    CaptureRegion::from_corners(ScreenPoint::new(x1, y1), ScreenPoint::new(x2, y2))
}

/// Parse `x,y`
pub fn parse_point(s: &str) -> Result<ScreenPoint, ConfigError> {
    let [x, y] = parse_ints::<2>(s)?;
    Ok(ScreenPoint::new(x, y))
}

fn parse_ints<const N: usize>(s: &str) -> Result<[i32; N], ConfigError> {
    let invalid = || ConfigError::InvalidCoordinates(s.to_string());

    let values = s
        .split(',')
        .map(|part| part.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;

    values.try_into().map_err(|_| invalid())
}

/// Wrap raw RGBA bytes as a frame, checking the buffer size
pub fn frame_from_raw(data: Vec<u8>, width: u32, height: u32) -> Result<RgbaImage, VisionError> {
    let expected = width as usize * height as usize * 4;
    if data.len() != expected || expected == 0 {
        return Err(VisionError::InvalidFrameData);
    }

    ImageBuffer::from_raw(width, height, data).ok_or(VisionError::InvalidFrameData)
}

/// Frame source that grabs the capture region from the desktop
#[cfg(feature = "desktop")]
pub struct ScreenCapture {
    region: CaptureRegion,
    screen: screenshots::Screen,
}

#[cfg(feature = "desktop")]
impl ScreenCapture {
    /// Bind to the display containing the region's top-left corner
    pub fn new(region: CaptureRegion) -> Result<Self, VisionError> {
        let screen = screenshots::Screen::from_point(region.left, region.top)
            .map_err(|e| VisionError::Capture(e.to_string()))?;

        log::info!(
            "Capturing {}x{} at ({}, {}) on display {}",
            region.width,
            region.height,
            region.left,
            region.top,
            screen.display_info.id
        );

        Ok(Self { region, screen })
    }
}

#[cfg(feature = "desktop")]
impl super::FrameSource for ScreenCapture {
    fn capture(&mut self) -> Result<RgbaImage, VisionError> {
        let display = &self.screen.display_info;
        let shot = self
            .screen
            .capture_area(
                self.region.left - display.x,
                self.region.top - display.y,
                self.region.width,
                self.region.height,
            )
            .map_err(|e| VisionError::Capture(e.to_string()))?;

        let (width, height) = (shot.width(), shot.height());
        frame_from_raw(shot.into_raw(), width, height)
    }
}
