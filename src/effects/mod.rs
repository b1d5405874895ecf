//! Effects module
//!
//! Visual effects driven by part bounding boxes. One effect is chosen at
//! startup and applied to every frame.

pub mod bounding_boxes;
pub mod face_overlay;
pub mod region_swap;

use serde::{Deserialize, Serialize};

use crate::compositor::{Canvas, CompositeError, EffectContext};
use crate::geometry::PartBoxes;
use crate::ml::BodyPart;

/// Effect types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    /// Exchange two parts
    SwapParts { a: BodyPart, b: BodyPart },
    /// Shuffle all detected parts and swap them in pairs
    ShuffleSwap,
    /// Cover the face with an image
    FaceOverlay,
    /// Outline each detected part
    BoundingBoxes,
}

impl Default for Effect {
    fn default() -> Self {
        Self::FaceOverlay
    }
}

impl Effect {
    /// Whether the effect needs an overlay image loaded
    pub fn needs_overlay(&self) -> bool {
        matches!(self, Effect::FaceOverlay)
    }

    /// Apply the effect to a canvas that already holds the frame
    pub fn apply(
        &self,
        context: &mut EffectContext,
        canvas: &mut Canvas,
        boxes: &PartBoxes,
    ) -> Result<(), CompositeError> {
        match *self {
            Effect::SwapParts { a, b } => {
                let box_a = boxes.get(a).ok_or(CompositeError::PartNotDetected(a))?;
                let box_b = boxes.get(b).ok_or(CompositeError::PartNotDetected(b))?;
                region_swap::swap_regions(canvas, &mut context.surfaces, box_a, box_b);
                Ok(())
            }
            Effect::ShuffleSwap => {
                region_swap::shuffle_swap(canvas, &mut context.surfaces, boxes, &mut context.rng);
                Ok(())
            }
            Effect::FaceOverlay => {
                let overlay = context
                    .overlay
                    .as_ref()
                    .ok_or(CompositeError::MissingOverlayImage)?;
                face_overlay::draw_on_face(canvas, boxes, overlay)
            }
            Effect::BoundingBoxes => {
                bounding_boxes::draw_bounding_boxes(canvas, boxes);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_effect_config_format() {
        let effect: Effect =
            serde_json::from_str(r#"{"type": "swap_parts", "a": "left_hand", "b": "right_hand"}"#).unwrap();
        assert_eq!(
            effect,
            Effect::SwapParts {
                a: BodyPart::LeftHand,
                b: BodyPart::RightHand
            }
        );
        let effect: Effect = serde_json::from_str(r#"{"type": "face_overlay"}"#).unwrap();
        assert_eq!(effect, Effect::FaceOverlay);
    }

    #[test]
    fn test_swap_requires_both_parts() {
        let mut boxes = PartBoxes::new();
        boxes.insert(BodyPart::LeftHand, BoundingBox::from_edges(0, 2, 2, 0).unwrap());
        let mut canvas = Canvas::new(4, 4);
        let mut context = EffectContext::with_seed(None, 1);

        let effect = Effect::SwapParts {
            a: BodyPart::LeftHand,
            b: BodyPart::RightHand,
        };
        let err = effect.apply(&mut context, &mut canvas, &boxes).unwrap_err();
        assert!(matches!(err, CompositeError::PartNotDetected(BodyPart::RightHand)));
    }

    #[test]
    fn test_face_overlay_without_image() {
        let mut canvas = Canvas::new(4, 4);
        let mut context = EffectContext::with_seed(None, 1);
        let err = Effect::FaceOverlay
            .apply(&mut context, &mut canvas, &PartBoxes::new())
            .unwrap_err();
        assert!(matches!(err, CompositeError::MissingOverlayImage));
    }

    #[test]
    fn test_face_overlay_with_image() {
        let mut boxes = PartBoxes::new();
        boxes.insert(BodyPart::LeftFace, BoundingBox::from_edges(0, 1, 1, 0).unwrap());
        boxes.insert(BodyPart::RightFace, BoundingBox::from_edges(0, 2, 1, 1).unwrap());
        let mut canvas = Canvas::new(4, 4);
        let overlay = RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 255]));
        let mut context = EffectContext::with_seed(Some(overlay), 1);

        Effect::FaceOverlay.apply(&mut context, &mut canvas, &boxes).unwrap();
        assert_eq!(canvas.image().get_pixel(0, 1).0, [1, 2, 3, 255]);
    }
}
