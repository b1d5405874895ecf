//! BodyPix part segmentation on ONNX Runtime
//!
//! Runs a BodyPix MobileNet export. The model takes a square NHWC float image
//! and produces `float_segments` (person logits) and `float_part_heatmaps`
//! (one score per part) at `input / output_stride` resolution.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbaImage;
use ndarray::Array4;

use super::{
    decode_part_map, resize_part_map, OutputStride, PartSegmentation, PartSegmenter,
    SegmentationError,
};
use crate::settings::resolve_asset_path;

const SEGMENTS_OUTPUT: &str = "float_segments";
const HEATMAPS_OUTPUT: &str = "float_part_heatmaps";

/// Snap a resolution to one the model accepts for a stride (`k * stride + 1`)
pub fn valid_input_resolution(resolution: u32, output_stride: OutputStride) -> u32 {
    let stride = output_stride.value();
    let resolution = resolution.max(stride + 1);
    ((resolution - 1) / stride) * stride + 1
}

/// BodyPix segmenter backed by an ORT session
pub struct BodyPixSegmenter {
    session: ort::session::Session,
    input_resolution: u32,
}

impl BodyPixSegmenter {
    /// Load the model at `model_path`
    pub fn load(model_path: &Path, input_resolution: u32) -> Result<Self, SegmentationError> {
        let model_path = Self::resolve_model_path(model_path)?;
        log::info!("Loading BodyPix model from {:?}", model_path);

        ort::init()
            .with_name("PartEffects")
            .commit()
            .map_err(|e| SegmentationError::ModelLoad(format!("Failed to initialize ORT: {}", e)))?;

        let session = ort::session::Session::builder()
            .map_err(|e| SegmentationError::ModelLoad(format!("Failed to create session builder: {}", e)))?
            .with_intra_threads(2)
            .map_err(|e| SegmentationError::ModelLoad(format!("Failed to set threads: {}", e)))?
            .commit_from_file(&model_path)
            .map_err(|e| SegmentationError::ModelLoad(e.to_string()))?;

        log::info!("BodyPix model loaded (input resolution {})", input_resolution);

        Ok(Self {
            session,
            input_resolution,
        })
    }

    /// Find the model as given, or next to the executable
    fn resolve_model_path(model_path: &Path) -> Result<PathBuf, SegmentationError> {
        resolve_asset_path(model_path)
            .ok_or_else(|| SegmentationError::ModelNotFound(model_path.display().to_string()))
    }

    /// Resize to the model input and normalize to [-1, 1], HWC order
    fn preprocess(frame: &RgbaImage, resolution: u32) -> Vec<f32> {
        let resized = imageops::resize(frame, resolution, resolution, FilterType::Triangle);
        let mut output = Vec::with_capacity((resolution * resolution * 3) as usize);
        for pixel in resized.pixels() {
            for channel in &pixel.0[..3] {
                output.push(*channel as f32 / 127.5 - 1.0);
            }
        }
        output
    }

    fn extract<'a>(
        outputs: &'a ort::session::SessionOutputs<'_>,
        name: &str,
        position: usize,
    ) -> Result<(Vec<i64>, &'a [f32]), SegmentationError> {
        let value = outputs
            .iter()
            .find(|(output_name, _)| *output_name == name)
            .or_else(|| outputs.iter().nth(position))
            .map(|(_, value)| value)
            .ok_or_else(|| SegmentationError::Inference(format!("Missing output {}", name)))?;

        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| SegmentationError::Inference(format!("Failed to extract {}: {}", name, e)))?;

        Ok((shape.iter().copied().collect(), data))
    }
}

impl PartSegmenter for BodyPixSegmenter {
    fn segment_parts(
        &mut self,
        frame: &RgbaImage,
        output_stride: OutputStride,
        segmentation_threshold: f32,
    ) -> Result<PartSegmentation, SegmentationError> {
        let resolution = valid_input_resolution(self.input_resolution, output_stride);
        let input = Self::preprocess(frame, resolution);

        let input_array = Array4::from_shape_vec(
            (1, resolution as usize, resolution as usize, 3),
            input,
        )
        .map_err(|e| SegmentationError::Inference(format!("Failed to create input array: {}", e)))?;

        let input_tensor = ort::value::Tensor::from_array(input_array)
            .map_err(|e| SegmentationError::Inference(format!("Failed to create tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| SegmentationError::Inference(e.to_string()))?;

        let (shape, segments) = Self::extract(&outputs, SEGMENTS_OUTPUT, 0)?;
        let (_, heatmaps) = Self::extract(&outputs, HEATMAPS_OUTPUT, 1)?;

        // [1, H, W, C]
        if shape.len() != 4 {
            return Err(SegmentationError::Inference(format!(
                "Unexpected segments shape {:?}",
                shape
            )));
        }
        let map_height = shape[1] as u32;
        let map_width = shape[2] as u32;

        let map = decode_part_map(
            segments,
            heatmaps,
            map_width,
            map_height,
            segmentation_threshold,
        )?;

        log::trace!(
            "Decoded {}x{} part map for {}x{} frame",
            map_width,
            map_height,
            frame.width(),
            frame.height()
        );

        Ok(resize_part_map(&map, frame.width(), frame.height()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_input_resolution() {
        assert_eq!(valid_input_resolution(257, OutputStride::Eight), 257);
        assert_eq!(valid_input_resolution(260, OutputStride::Sixteen), 257);
        assert_eq!(valid_input_resolution(513, OutputStride::ThirtyTwo), 513);
        assert_eq!(valid_input_resolution(1, OutputStride::Eight), 9);
    }

    #[test]
    fn test_preprocess_normalizes() {
        let frame = RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 127, 255]));
        let input = BodyPixSegmenter::preprocess(&frame, 2);
        assert_eq!(input.len(), 2 * 2 * 3);
        assert!((input[0] - 1.0).abs() < 1e-6);
        assert!((input[1] + 1.0).abs() < 1e-6);
        assert!(input[2].abs() < 0.01);
    }

    #[test]
    fn test_missing_model_reported() {
        let err = BodyPixSegmenter::resolve_model_path(Path::new("does/not/exist.onnx"))
            .unwrap_err();
        assert!(matches!(err, SegmentationError::ModelNotFound(_)));
    }
}
