//! Part Effects - live body-part segmentation effects
//!
//! Captures camera frames, segments them into 24 BodyPix body parts, derives
//! a bounding box per part and draws an effect over the frame: swapping two
//! parts, shuffling all of them, covering the face with an image, or
//! outlining each part.

pub mod app;
pub mod camera;
pub mod compositor;
pub mod demo;
pub mod effects;
pub mod geometry;
pub mod ml;
pub mod pipeline;
pub mod settings;

pub use app::App;
