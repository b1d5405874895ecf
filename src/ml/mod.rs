//! ML inference module
//!
//! Body part segmentation. A [`PartSegmenter`] turns a camera frame into a
//! [`PartSegmentation`]: one label per pixel, either a part index or
//! [`UNLABELED`].

mod body_pix;
mod parts;

pub use body_pix::BodyPixSegmenter;
pub use parts::{BodyPart, NUM_PARTS};

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Label value for pixels where no part was detected
pub const UNLABELED: i32 = -1;

/// Segmentation errors
#[derive(Debug, thiserror::Error)]
pub enum SegmentationError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    #[error("Failed to load model: {0}")]
    ModelLoad(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Invalid label buffer: {0}")]
    InvalidLabelBuffer(String),
    #[error("Invalid output stride {0} (expected 8, 16 or 32)")]
    InvalidOutputStride(u32),
}

/// Per-pixel part labels for one frame, row-major
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartSegmentation {
    data: Vec<i32>,
    width: u32,
    height: u32,
}

impl PartSegmentation {
    /// Wrap a label buffer, checking its size and label range
    pub fn new(data: Vec<i32>, width: u32, height: u32) -> Result<Self, SegmentationError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(SegmentationError::InvalidLabelBuffer(format!(
                "{} labels for a {}x{} buffer",
                data.len(),
                width,
                height
            )));
        }

        if let Some(bad) = data
            .iter()
            .find(|&&label| label != UNLABELED && !(0..NUM_PARTS as i32).contains(&label))
        {
            return Err(SegmentationError::InvalidLabelBuffer(format!(
                "label {} out of range",
                bad
            )));
        }

        Ok(Self { data, width, height })
    }

    /// A buffer with every pixel unlabeled
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            data: vec![UNLABELED; width as usize * height as usize],
            width,
            height,
        }
    }

    pub fn data(&self) -> &[i32] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Label at pixel coordinates
    pub fn label_at(&self, x: u32, y: u32) -> Option<i32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get((y * self.width + x) as usize).copied()
    }
}

/// Model output stride; smaller is slower and more precise
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum OutputStride {
    Eight,
    Sixteen,
    ThirtyTwo,
}

impl OutputStride {
    pub fn value(self) -> u32 {
        match self {
            OutputStride::Eight => 8,
            OutputStride::Sixteen => 16,
            OutputStride::ThirtyTwo => 32,
        }
    }
}

impl Default for OutputStride {
    fn default() -> Self {
        Self::Eight
    }
}

impl TryFrom<u32> for OutputStride {
    type Error = SegmentationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            8 => Ok(OutputStride::Eight),
            16 => Ok(OutputStride::Sixteen),
            32 => Ok(OutputStride::ThirtyTwo),
            other => Err(SegmentationError::InvalidOutputStride(other)),
        }
    }
}

impl From<OutputStride> for u32 {
    fn from(stride: OutputStride) -> Self {
        stride.value()
    }
}

/// Produces a part label buffer for a frame
pub trait PartSegmenter: Send {
    /// Segment `frame` into body parts. The returned buffer has the frame's
    /// dimensions.
    fn segment_parts(
        &mut self,
        frame: &RgbaImage,
        output_stride: OutputStride,
        segmentation_threshold: f32,
    ) -> Result<PartSegmentation, SegmentationError>;
}

impl<T: PartSegmenter + ?Sized> PartSegmenter for Box<T> {
    fn segment_parts(
        &mut self,
        frame: &RgbaImage,
        output_stride: OutputStride,
        segmentation_threshold: f32,
    ) -> Result<PartSegmentation, SegmentationError> {
        (**self).segment_parts(frame, output_stride, segmentation_threshold)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decode raw model outputs into a part label grid.
///
/// `segments` holds one logit per cell, `heatmaps` holds `NUM_PARTS` scores per
/// cell (HWC). A cell gets a label only when the person probability exceeds
/// `threshold`; the label is the highest scoring part.
pub fn decode_part_map(
    segments: &[f32],
    heatmaps: &[f32],
    width: u32,
    height: u32,
    threshold: f32,
) -> Result<PartSegmentation, SegmentationError> {
    let cells = width as usize * height as usize;
    if segments.len() != cells || heatmaps.len() != cells * NUM_PARTS {
        return Err(SegmentationError::Inference(format!(
            "unexpected output sizes: {} segments, {} heatmap values for {}x{}",
            segments.len(),
            heatmaps.len(),
            width,
            height
        )));
    }

    let data = segments
        .iter()
        .zip(heatmaps.chunks_exact(NUM_PARTS))
        .map(|(&logit, scores)| {
            if sigmoid(logit) <= threshold {
                return UNLABELED;
            }
            let mut best = 0;
            for (part, &score) in scores.iter().enumerate() {
                if score > scores[best] {
                    best = part;
                }
            }
            best as i32
        })
        .collect();

    Ok(PartSegmentation { data, width, height })
}

/// Nearest-neighbour rescale of a label grid
pub fn resize_part_map(map: &PartSegmentation, width: u32, height: u32) -> PartSegmentation {
    if map.width == width && map.height == height {
        return map.clone();
    }
    if map.width == 0 || map.height == 0 {
        return PartSegmentation::empty(width, height);
    }

    let mut data = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        let src_y = ((y as u64 * map.height as u64) / height as u64) as u32;
        for x in 0..width {
            let src_x = ((x as u64 * map.width as u64) / width as u64) as u32;
            data.push(map.data[(src_y * map.width + src_x) as usize]);
        }
    }

    PartSegmentation { data, width, height }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_buffer_size_checked() {
        assert!(PartSegmentation::new(vec![0, 0, 1], 2, 2).is_err());
        assert!(PartSegmentation::new(vec![0, 0, 1, -1], 2, 2).is_ok());
    }

    #[test]
    fn test_label_buffer_range_checked() {
        assert!(PartSegmentation::new(vec![24], 1, 1).is_err());
        assert!(PartSegmentation::new(vec![-2], 1, 1).is_err());
        assert!(PartSegmentation::new(vec![23], 1, 1).is_ok());
    }

    #[test]
    fn test_label_at() {
        let seg = PartSegmentation::new(vec![0, 0, 1, -1], 2, 2).unwrap();
        assert_eq!(seg.label_at(0, 1), Some(1));
        assert_eq!(seg.label_at(1, 1), Some(UNLABELED));
        assert_eq!(seg.label_at(2, 0), None);
    }

    #[test]
    fn test_output_stride_parse() {
        assert_eq!(OutputStride::try_from(16).unwrap(), OutputStride::Sixteen);
        assert!(OutputStride::try_from(12).is_err());
        let stride: OutputStride = serde_json::from_str("32").unwrap();
        assert_eq!(stride, OutputStride::ThirtyTwo);
        assert!(serde_json::from_str::<OutputStride>("4").is_err());
    }

    #[test]
    fn test_decode_applies_threshold_and_argmax() {
        let mut heatmaps = vec![0.0f32; 2 * NUM_PARTS];
        heatmaps[5] = 3.0;
        heatmaps[NUM_PARTS + 11] = 2.0;
        // First cell confidently a person, second well below threshold
        let segments = [4.0, -4.0];

        let map = decode_part_map(&segments, &heatmaps, 2, 1, 0.5).unwrap();
        assert_eq!(map.data(), &[5, UNLABELED]);

        let map = decode_part_map(&[4.0, 4.0], &heatmaps, 2, 1, 0.5).unwrap();
        assert_eq!(map.data(), &[5, 11]);
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        assert!(decode_part_map(&[0.0], &[0.0; 3], 1, 1, 0.5).is_err());
    }

    #[test]
    fn test_resize_part_map_nearest() {
        let map = PartSegmentation::new(vec![0, 1, 2, 3], 2, 2).unwrap();
        let big = resize_part_map(&map, 4, 4);
        assert_eq!(
            big.data(),
            &[0, 0, 1, 1, 0, 0, 1, 1, 2, 2, 3, 3, 2, 2, 3, 3]
        );
    }
}
