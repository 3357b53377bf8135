//! Annotated preview frames

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::game::{BoundingBox, DetectionClass, Observation, ScreenPoint};

const ACTOR_COLOR: Rgba<u8> = Rgba([0, 200, 255, 255]);
const PLATFORM_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const TARGET_COLOR: Rgba<u8> = Rgba([255, 64, 64, 255]);
const LINE_COLOR: Rgba<u8> = Rgba([255, 255, 0, 255]);
const ANCHOR_RADIUS: i32 = 5;

/// Draw the observation onto a copy of the frame: every accepted box, the
/// chosen target outlined twice, both anchors and the jump line.
pub fn annotate(frame: &RgbaImage, observation: &Observation) -> RgbaImage {
    let mut canvas = frame.clone();

    for det in &observation.detections {
        let color = match det.class {
            DetectionClass::Actor => ACTOR_COLOR,
            DetectionClass::Platform => PLATFORM_COLOR,
        };
        draw_box(&mut canvas, &det.bbox, color, 0);
    }

    if let (Some(actor), Some(target)) = (&observation.actor, &observation.platform) {
        draw_line_segment_mut(
            &mut canvas,
            (actor.anchor.x as f32, actor.anchor.y as f32),
            (target.anchor.x as f32, target.anchor.y as f32),
            LINE_COLOR,
        );
    }

    if let Some(target) = &observation.platform {
        draw_box(&mut canvas, &target.detection.bbox, TARGET_COLOR, 0);
        draw_box(&mut canvas, &target.detection.bbox, TARGET_COLOR, 1);
        draw_anchor(&mut canvas, target.anchor, TARGET_COLOR);
    }

    if let Some(actor) = &observation.actor {
        draw_anchor(&mut canvas, actor.anchor, ACTOR_COLOR);
    }

    canvas
}

fn draw_box(canvas: &mut RgbaImage, bbox: &BoundingBox, color: Rgba<u8>, inset: i32) {
    let (x1, y1, x2, y2) = bbox.to_pixels();
    let width = (x2 - x1 - 2 * inset).max(1) as u32;
    let height = (y2 - y1 - 2 * inset).max(1) as u32;
    draw_hollow_rect_mut(
        canvas,
        Rect::at(x1 + inset, y1 + inset).of_size(width, height),
        color,
    );
}

fn draw_anchor(canvas: &mut RgbaImage, point: ScreenPoint, color: Rgba<u8>) {
    draw_filled_circle_mut(canvas, (point.x, point.y), ANCHOR_RADIUS, color);
}
