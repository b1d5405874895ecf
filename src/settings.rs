//! Settings for Part Effects
//!
//! Loaded from a JSON file. Every field has a default, so a missing file or a
//! partial file both work.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::effects::Effect;
use crate::ml::OutputStride;
use crate::pipeline::SegmentationParams;

/// Environment variable naming the settings file
pub const CONFIG_ENV: &str = "PART_EFFECTS_CONFIG";
/// Settings file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "part-effects.json";

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Find a relative asset in the working directory, or next to the executable
pub fn resolve_asset_path(path: &Path) -> Option<PathBuf> {
    if path.exists() {
        return Some(path.to_path_buf());
    }

    if path.is_relative() {
        if let Ok(exe_path) = std::env::current_exe() {
            // Walk up from target/{debug,release}
            for dir in exe_path.ancestors().skip(1).take(3) {
                let candidate = dir.join(path);
                if candidate.exists() {
                    return Some(candidate);
                }
            }
        }
    }

    None
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Camera label to select; the first camera when unset
    pub camera_label: Option<String>,
    /// Requested camera frame width
    pub camera_width: u32,
    /// BodyPix output stride (8, 16 or 32)
    pub output_stride: OutputStride,
    /// Person probability above which a pixel gets a part label
    pub segmentation_threshold: f32,
    /// Square model input size, snapped to the stride
    pub input_resolution: u32,
    /// ONNX model file
    pub model_path: PathBuf,
    /// Image drawn by the face overlay effect
    pub face_image: PathBuf,
    /// Effect applied to every frame
    pub effect: Effect,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            camera_label: None,
            camera_width: 600,
            output_stride: OutputStride::Eight,
            segmentation_threshold: 0.5,
            input_resolution: 257,
            model_path: PathBuf::from("models/bodypix.onnx"),
            face_image: PathBuf::from("assets/face.png"),
            effect: Effect::FaceOverlay,
        }
    }
}

impl Settings {
    /// Load from `PART_EFFECTS_CONFIG`, else `part-effects.json`, else defaults
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }

        let path = Path::new(DEFAULT_CONFIG_FILE);
        if path.exists() {
            Self::load_from(path)
        } else {
            log::info!("No {} found, using default settings", DEFAULT_CONFIG_FILE);
            Ok(Self::default())
        }
    }

    /// Load and validate a settings file
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json(&contents).map_err(|e| match e {
            SettingsError::Parse { source, .. } => SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        log::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Parse and validate settings JSON
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(json).map_err(|source| SettingsError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(0.0..=1.0).contains(&self.segmentation_threshold) {
            return Err(SettingsError::Invalid(format!(
                "segmentation_threshold {} is outside [0, 1]",
                self.segmentation_threshold
            )));
        }
        if self.camera_width == 0 {
            return Err(SettingsError::Invalid("camera_width must be positive".to_string()));
        }
        if self.input_resolution == 0 {
            return Err(SettingsError::Invalid("input_resolution must be positive".to_string()));
        }
        Ok(())
    }

    pub fn segmentation_params(&self) -> SegmentationParams {
        SegmentationParams {
            output_stride: self.output_stride,
            segmentation_threshold: self.segmentation_threshold,
        }
    }
}
