//! Named offscreen surfaces
//!
//! Scratch images reused across frames. Owned by an [`EffectContext`] rather
//! than living for the whole process.
//!
//! [`EffectContext`]: super::EffectContext

use std::collections::HashMap;

use image::RgbaImage;

#[derive(Default)]
pub struct SurfaceCache {
    surfaces: HashMap<String, RgbaImage>,
}

impl SurfaceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the surface called `name` out of the cache, sized `width` x
    /// `height`. Hand it back with [`SurfaceCache::put_back`] to reuse it.
    pub fn take(&mut self, name: &str, width: u32, height: u32) -> RgbaImage {
        match self.surfaces.remove(name) {
            Some(surface) if surface.dimensions() == (width, height) => surface,
            _ => {
                log::debug!("Creating offscreen surface '{}' ({}x{})", name, width, height);
                RgbaImage::new(width, height)
            }
        }
    }

    pub fn put_back(&mut self, name: &str, surface: RgbaImage) {
        self.surfaces.insert(name.to_string(), surface);
    }

    pub fn get(&self, name: &str) -> Option<&RgbaImage> {
        self.surfaces.get(name)
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Release every surface
    pub fn clear(&mut self) {
        self.surfaces.clear();
    }
}
