//! Region Swap effect
//!
//! Exchanges the pixels of two part boxes, each stretched to fit the other.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::compositor::{Canvas, SurfaceCache};
use crate::geometry::{BoundingBox, PartBoxes};

const SURFACE_A: &str = "swap-a";
const SURFACE_B: &str = "swap-b";

/// Swap the regions covered by `a` and `b`.
///
/// Both regions are captured before either is written. Boxes without area
/// leave the canvas untouched.
pub fn swap_regions(canvas: &mut Canvas, surfaces: &mut SurfaceCache, a: &BoundingBox, b: &BoundingBox) {
    if !a.has_area() || !b.has_area() {
        return;
    }

    let mut pixels_a = surfaces.take(SURFACE_A, a.width(), a.height());
    let mut pixels_b = surfaces.take(SURFACE_B, b.width(), b.height());
    canvas.read_region_into(&mut pixels_a, a.left(), a.top());
    canvas.read_region_into(&mut pixels_b, b.left(), b.top());

    draw_into(canvas, &pixels_b, a);
    draw_into(canvas, &pixels_a, b);

    surfaces.put_back(SURFACE_A, pixels_a);
    surfaces.put_back(SURFACE_B, pixels_b);
}

/// Draw `pixels` (captured at its own size) so it fills `target`
fn draw_into(canvas: &mut Canvas, pixels: &image::RgbaImage, target: &BoundingBox) {
    let source_w = pixels.width() as f32;
    let source_h = pixels.height() as f32;

    canvas.with_saved(|canvas| {
        canvas.translate(target.left() as f32, target.top() as f32);
        canvas.scale(target.width() as f32 / source_w, target.height() as f32 / source_h);
        canvas.draw_image(pixels, 0.0, 0.0, source_w, source_h);
    });
}

/// Shuffle the detected parts and swap them pairwise
pub fn shuffle_swap<R: Rng + ?Sized>(
    canvas: &mut Canvas,
    surfaces: &mut SurfaceCache,
    boxes: &PartBoxes,
    rng: &mut R,
) {
    let mut candidates: Vec<BoundingBox> = boxes
        .iter()
        .map(|(_, bounding_box)| *bounding_box)
        .filter(BoundingBox::has_area)
        .collect();
    candidates.shuffle(rng);

    for pair in candidates.chunks_exact(2) {
        swap_regions(canvas, surfaces, &pair[0], &pair[1]);
    }
}
