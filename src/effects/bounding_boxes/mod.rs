//! Bounding Boxes effect
//!
//! Outlines every detected part in its own colour.

use image::Rgba;

use crate::compositor::Canvas;
use crate::geometry::PartBoxes;
use crate::ml::{BodyPart, NUM_PARTS};

const LINE_WIDTH: u32 = 2;

/// Colour for a part, spread around the hue wheel
pub fn part_color(part: BodyPart) -> Rgba<u8> {
    let hue = part.index() as f32 / NUM_PARTS as f32 * 6.0;
    let sector = hue.floor() as u32;
    let f = hue - hue.floor();
    let rising = (f * 255.0) as u8;
    let falling = 255 - rising;
    let (r, g, b) = match sector {
        0 => (255, rising, 0),
        1 => (falling, 255, 0),
        2 => (0, 255, rising),
        3 => (0, falling, 255),
        4 => (rising, 0, 255),
        _ => (255, 0, falling),
    };
    Rgba([r, g, b, 255])
}

/// Stroke the box of each detected part
pub fn draw_bounding_boxes(canvas: &mut Canvas, boxes: &PartBoxes) {
    for (part, bounding_box) in boxes.iter() {
        canvas.stroke_rect(
            bounding_box.left(),
            bounding_box.top(),
            bounding_box.width(),
            bounding_box.height(),
            part_color(part),
            LINE_WIDTH,
        );
    }
}
