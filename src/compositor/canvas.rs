//! CPU drawing surface
//!
//! A small 2D canvas over an RGBA image: region reads, scaled image draws
//! with source-over blending, rectangle outlines, and a save/restore stack
//! for the translate/scale transform.

use image::{Pixel, Rgba, RgbaImage};

/// Source-over blend; opaque and fully transparent sources are exact
fn composite_over(dst: &mut Rgba<u8>, src: &Rgba<u8>) {
    match src.0[3] {
        0 => {}
        255 => *dst = *src,
        _ => dst.blend(src),
    }
}

/// Translate-then-scale placement applied to draw calls
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translate: [f32; 2],
    pub scale: [f32; 2],
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translate: [0.0, 0.0],
        scale: [1.0, 1.0],
    };

    /// Map a user-space point to canvas pixels
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.translate[0] + x * self.scale[0],
            self.translate[1] + y * self.scale[1],
        )
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// The display frame plus drawing state
pub struct Canvas {
    frame: RgbaImage,
    transform: Transform,
    saved: Vec<Transform>,
}

impl Canvas {
    /// Create a transparent canvas
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_image(RgbaImage::new(width, height))
    }

    pub fn from_image(frame: RgbaImage) -> Self {
        Self {
            frame,
            transform: Transform::IDENTITY,
            saved: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.frame
    }

    pub fn into_image(self) -> RgbaImage {
        self.frame
    }

    /// Replace the canvas contents with `frame`, resizing to match
    pub fn draw_frame(&mut self, frame: &RgbaImage) {
        if self.frame.dimensions() == frame.dimensions() {
            self.frame.copy_from_slice(frame);
        } else {
            self.frame = frame.clone();
        }
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    /// Push the current transform
    pub fn save(&mut self) {
        self.saved.push(self.transform);
    }

    /// Pop the last saved transform; no-op when nothing is saved
    pub fn restore(&mut self) {
        if let Some(transform) = self.saved.pop() {
            self.transform = transform;
        }
    }

    pub fn translate(&mut self, x: f32, y: f32) {
        let (tx, ty) = self.transform.apply(x, y);
        self.transform.translate = [tx, ty];
    }

    pub fn scale(&mut self, x: f32, y: f32) {
        self.transform.scale[0] *= x;
        self.transform.scale[1] *= y;
    }

    /// Run `f` between a save and a restore
    pub fn with_saved<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.save();
        let result = f(self);
        self.restore();
        result
    }

    /// Copy a canvas region into `dst`, starting at (x, y). Pixels outside the
    /// canvas read as transparent.
    pub fn read_region_into(&self, dst: &mut RgbaImage, x: u32, y: u32) {
        for (dx, dy, pixel) in dst.enumerate_pixels_mut() {
            let sx = x + dx;
            let sy = y + dy;
            *pixel = if sx < self.frame.width() && sy < self.frame.height() {
                *self.frame.get_pixel(sx, sy)
            } else {
                Rgba([0, 0, 0, 0])
            };
        }
    }

    /// Copy of a canvas region
    pub fn get_image_data(&self, x: u32, y: u32, width: u32, height: u32) -> RgbaImage {
        let mut region = RgbaImage::new(width, height);
        self.read_region_into(&mut region, x, y);
        region
    }

    /// Draw `src` stretched over the user-space rect (dx, dy, dw, dh).
    ///
    /// Nearest-neighbour sampling at pixel centres, source-over blending,
    /// clipped to the canvas.
    pub fn draw_image(&mut self, src: &RgbaImage, dx: f32, dy: f32, dw: f32, dh: f32) {
        if src.width() == 0 || src.height() == 0 {
            return;
        }

        let (x0, y0) = self.transform.apply(dx, dy);
        let (x1, y1) = self.transform.apply(dx + dw, dy + dh);
        let (x0, x1) = (x0.min(x1), x0.max(x1));
        let (y0, y1) = (y0.min(y1), y0.max(y1));
        let dest_w = x1 - x0;
        let dest_h = y1 - y0;
        if dest_w <= 0.0 || dest_h <= 0.0 {
            return;
        }

        let col_start = x0.round().max(0.0) as u32;
        let col_end = (x1.round().max(0.0) as u32).min(self.frame.width());
        let row_start = y0.round().max(0.0) as u32;
        let row_end = (y1.round().max(0.0) as u32).min(self.frame.height());

        for py in row_start..row_end {
            let v = ((py as f32 + 0.5 - y0) / dest_h * src.height() as f32) as u32;
            let sy = v.min(src.height() - 1);
            for px in col_start..col_end {
                let u = ((px as f32 + 0.5 - x0) / dest_w * src.width() as f32) as u32;
                let sx = u.min(src.width() - 1);
                composite_over(self.frame.get_pixel_mut(px, py), src.get_pixel(sx, sy));
            }
        }
    }

    /// Outline a rect in canvas pixels
    pub fn stroke_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: Rgba<u8>, line_width: u32) {
        let line_width = line_width.max(1);
        let x_end = x.saturating_add(width);
        let y_end = y.saturating_add(height);

        for py in y..=y_end {
            for px in x..=x_end {
                let on_edge = px < x + line_width
                    || px + line_width > x_end
                    || py < y + line_width
                    || py + line_width > y_end;
                if on_edge && px < self.frame.width() && py < self.frame.height() {
                    composite_over(self.frame.get_pixel_mut(px, py), &color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    #[test]
    fn test_save_restore_transform() {
        let mut canvas = Canvas::new(4, 4);
        canvas.save();
        canvas.translate(2.0, 3.0);
        canvas.scale(2.0, 0.5);
        assert_eq!(canvas.transform().apply(1.0, 2.0), (4.0, 4.0));
        canvas.restore();
        assert_eq!(canvas.transform(), Transform::IDENTITY);

        // Unbalanced restore keeps the current transform
        canvas.restore();
        assert_eq!(canvas.transform(), Transform::IDENTITY);
    }

    #[test]
    fn test_with_saved_restores() {
        let mut canvas = Canvas::new(4, 4);
        canvas.with_saved(|c| {
            c.translate(1.0, 1.0);
            c.scale(3.0, 3.0);
        });
        assert_eq!(canvas.transform(), Transform::IDENTITY);
    }

    #[test]
    fn test_get_image_data_clips() {
        let canvas = Canvas::from_image(RgbaImage::from_pixel(2, 2, RED));
        let region = canvas.get_image_data(1, 1, 2, 2);
        assert_eq!(*region.get_pixel(0, 0), RED);
        assert_eq!(region.get_pixel(1, 1).0[3], 0);
    }

    #[test]
    fn test_draw_image_scales_nearest() {
        let mut src = RgbaImage::from_pixel(2, 1, RED);
        src.put_pixel(1, 0, BLUE);

        let mut canvas = Canvas::new(4, 2);
        canvas.draw_image(&src, 0.0, 0.0, 4.0, 2.0);
        let out = canvas.image();
        assert_eq!(*out.get_pixel(0, 0), RED);
        assert_eq!(*out.get_pixel(1, 1), RED);
        assert_eq!(*out.get_pixel(2, 0), BLUE);
        assert_eq!(*out.get_pixel(3, 1), BLUE);
    }

    #[test]
    fn test_draw_image_uses_transform() {
        let src = RgbaImage::from_pixel(1, 1, RED);
        let mut canvas = Canvas::new(6, 6);
        canvas.with_saved(|c| {
            c.translate(2.0, 2.0);
            c.scale(2.0, 2.0);
            c.draw_image(&src, 0.0, 0.0, 1.0, 1.0);
        });
        let out = canvas.image();
        assert_eq!(*out.get_pixel(2, 2), RED);
        assert_eq!(*out.get_pixel(3, 3), RED);
        assert_eq!(out.get_pixel(4, 4).0[3], 0);
        assert_eq!(out.get_pixel(1, 1).0[3], 0);
    }

    #[test]
    fn test_draw_image_clips_outside() {
        let src = RgbaImage::from_pixel(2, 2, RED);
        let mut canvas = Canvas::new(3, 3);
        canvas.draw_image(&src, 2.0, 2.0, 4.0, 4.0);
        assert_eq!(*canvas.image().get_pixel(2, 2), RED);
        assert_eq!(canvas.image().get_pixel(1, 1).0[3], 0);
    }

    #[test]
    fn test_transparent_source_keeps_destination() {
        let src = RgbaImage::from_pixel(1, 1, Rgba([0, 255, 0, 0]));
        let mut canvas = Canvas::from_image(RgbaImage::from_pixel(1, 1, BLUE));
        canvas.draw_image(&src, 0.0, 0.0, 1.0, 1.0);
        assert_eq!(*canvas.image().get_pixel(0, 0), BLUE);
    }

    #[test]
    fn test_stroke_rect_outline_only() {
        let mut canvas = Canvas::new(5, 5);
        canvas.stroke_rect(0, 0, 4, 4, RED, 1);
        let out = canvas.image();
        assert_eq!(*out.get_pixel(0, 2), RED);
        assert_eq!(*out.get_pixel(4, 4), RED);
        assert_eq!(out.get_pixel(2, 2).0[3], 0);
    }

    #[test]
    fn test_draw_frame_resizes() {
        let mut canvas = Canvas::new(1, 1);
        canvas.draw_frame(&RgbaImage::from_pixel(3, 2, BLUE));
        assert_eq!((canvas.width(), canvas.height()), (3, 2));
        assert_eq!(*canvas.image().get_pixel(2, 1), BLUE);
    }
}
