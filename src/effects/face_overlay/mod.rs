//! Face Overlay effect
//!
//! Stretches an image over the combined box of both face halves.

use image::RgbaImage;

use crate::compositor::{Canvas, CompositeError};
use crate::geometry::{BoundingBox, PartBoxes};
use crate::ml::BodyPart;

/// Union of the left and right face boxes
pub fn face_box(boxes: &PartBoxes) -> Result<BoundingBox, CompositeError> {
    let left = boxes
        .get(BodyPart::LeftFace)
        .ok_or(CompositeError::PartNotDetected(BodyPart::LeftFace))?;
    let right = boxes
        .get(BodyPart::RightFace)
        .ok_or(CompositeError::PartNotDetected(BodyPart::RightFace))?;
    Ok(left.union(right))
}

/// Draw `overlay` sized to the face box, anchored at its left/bottom corner.
///
/// Fails when either face part is missing from `boxes`.
pub fn draw_on_face(canvas: &mut Canvas, boxes: &PartBoxes, overlay: &RgbaImage) -> Result<(), CompositeError> {
    let face = face_box(boxes)?;
    if !face.has_area() {
        return Ok(());
    }

    canvas.draw_image(
        overlay,
        face.left() as f32,
        face.bottom() as f32,
        face.width() as f32,
        face.height() as f32,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const OVERLAY: Rgba<u8> = Rgba([9, 200, 9, 255]);

    fn face_boxes() -> PartBoxes {
        let mut boxes = PartBoxes::new();
        boxes.insert(BodyPart::LeftFace, BoundingBox::from_edges(2, 4, 4, 1).unwrap());
        boxes.insert(BodyPart::RightFace, BoundingBox::from_edges(1, 6, 3, 4).unwrap());
        boxes
    }

    #[test]
    fn test_face_box_is_union() {
        let face = face_box(&face_boxes()).unwrap();
        assert_eq!((face.top(), face.right(), face.bottom(), face.left()), (1, 6, 4, 1));
    }

    #[test]
    fn test_overlay_drawn_from_bottom_edge() {
        let mut canvas = Canvas::new(10, 10);
        let overlay = RgbaImage::from_pixel(2, 2, OVERLAY);
        draw_on_face(&mut canvas, &face_boxes(), &overlay).unwrap();

        let out = canvas.image();
        // Face box is 5x3 at left=1, drawn starting at y=bottom=4
        for y in 4..7 {
            for x in 1..6 {
                assert_eq!(*out.get_pixel(x, y), OVERLAY, "pixel {},{}", x, y);
            }
        }
        assert_eq!(out.get_pixel(1, 3).0[3], 0);
        assert_eq!(out.get_pixel(6, 4).0[3], 0);
        assert_eq!(out.get_pixel(1, 7).0[3], 0);
    }

    #[test]
    fn test_missing_face_part_fails() {
        let mut boxes = PartBoxes::new();
        boxes.insert(BodyPart::LeftFace, BoundingBox::from_edges(2, 4, 4, 1).unwrap());
        let mut canvas = Canvas::new(8, 8);
        let overlay = RgbaImage::from_pixel(1, 1, OVERLAY);

        let err = draw_on_face(&mut canvas, &boxes, &overlay).unwrap_err();
        assert!(matches!(err, CompositeError::PartNotDetected(BodyPart::RightFace)));
        assert!(canvas.image().pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_zero_area_face_is_noop() {
        let mut boxes = PartBoxes::new();
        boxes.insert(BodyPart::LeftFace, BoundingBox::at(3, 3));
        boxes.insert(BodyPart::RightFace, BoundingBox::at(3, 5));
        let mut canvas = Canvas::new(8, 8);
        let overlay = RgbaImage::from_pixel(1, 1, OVERLAY);

        draw_on_face(&mut canvas, &boxes, &overlay).unwrap();
        assert!(canvas.image().pixels().all(|p| p.0[3] == 0));
    }
}
