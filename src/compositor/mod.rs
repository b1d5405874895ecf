//! Frame compositing
//!
//! The drawing surface the effects write into, plus the per-session state
//! they share.

mod canvas;
mod surfaces;

pub use canvas::{Canvas, Transform};
pub use surfaces::SurfaceCache;

use image::RgbaImage;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::ml::BodyPart;

/// Compositing errors
#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    #[error("Part not detected in this frame: {0}")]
    PartNotDetected(BodyPart),
    #[error("No overlay image loaded")]
    MissingOverlayImage,
}

/// State shared by effects across frames
pub struct EffectContext {
    /// Offscreen scratch surfaces
    pub surfaces: SurfaceCache,
    /// Image drawn by the face overlay
    pub overlay: Option<RgbaImage>,
    /// Randomness for the shuffle effect
    pub rng: StdRng,
}

impl EffectContext {
    pub fn new(overlay: Option<RgbaImage>) -> Self {
        Self {
            surfaces: SurfaceCache::new(),
            overlay,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Context with a fixed rng seed
    pub fn with_seed(overlay: Option<RgbaImage>, seed: u64) -> Self {
        Self {
            surfaces: SurfaceCache::new(),
            overlay,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Drop the offscreen surfaces
    pub fn teardown(&mut self) {
        self.surfaces.clear();
    }
}
