//! Demo lifecycle
//!
//! Idle until the model is loaded and the camera is open, then Running for
//! the rest of the session. Each [`Demo::tick`] is one render-loop step.

use std::path::Path;

use image::RgbaImage;

use crate::camera::{constraints_for_label, is_mobile, CameraCapture, CameraError, CameraFrame, VideoConstraints};
use crate::compositor::EffectContext;
use crate::ml::PartSegmenter;
use crate::pipeline::{FramePipeline, InferenceStage, ProcessedFrame};
use crate::settings::{resolve_asset_path, Settings};

/// Shown when no camera can be opened
pub const CAMERA_FAILURE_MESSAGE: &str =
    "this system does not support video capture, or this device does not have a camera";

/// Shown while the model loads
pub const LOADING_MESSAGE: &str = "Loading model...";

/// Setup errors
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("Failed to load overlay image {path}: {source}")]
    OverlayImage {
        path: String,
        source: image::ImageError,
    },
    #[error("Failed to start segmentation worker: {0}")]
    Worker(#[from] std::io::Error),
}

/// Source of camera frames
pub trait FrameSource: Send {
    /// Most recent frame, if any has arrived
    fn latest_frame(&self) -> Option<CameraFrame>;
}

impl FrameSource for CameraCapture {
    fn latest_frame(&self) -> Option<CameraFrame> {
        CameraCapture::latest_frame(self)
    }
}

/// Open the system camera
pub fn open_system_camera(
    constraints: &VideoConstraints,
    label: Option<&str>,
) -> Result<Box<dyn FrameSource>, CameraError> {
    Ok(Box::new(CameraCapture::open(constraints, label)?))
}

/// Load the face overlay image, looked up like the model file
pub fn load_overlay_image(path: &Path) -> Result<RgbaImage, SetupError> {
    let resolved = resolve_asset_path(path).unwrap_or_else(|| path.to_path_buf());
    let image = image::open(&resolved).map_err(|source| SetupError::OverlayImage {
        path: path.display().to_string(),
        source,
    })?;
    Ok(image.into_rgba8())
}

/// User-facing status line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub visible: bool,
}

impl Status {
    pub fn show(&mut self, message: impl Into<String>) {
        self.message = message.into();
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }
}

pub enum DemoState {
    /// Waiting for model and camera
    Idle,
    /// Frames are flowing
    Running {
        camera: Box<dyn FrameSource>,
        stage: InferenceStage,
        last_submitted: u64,
    },
}

pub struct Demo {
    state: DemoState,
    status: Status,
    setup_attempted: bool,
}

impl Default for Demo {
    fn default() -> Self {
        Self::new()
    }
}

impl Demo {
    pub fn new() -> Self {
        Self {
            state: DemoState::Idle,
            status: Status {
                message: LOADING_MESSAGE.to_string(),
                visible: true,
            },
            setup_attempted: false,
        }
    }

    /// True exactly once: the caller should run setup now. Later calls,
    /// including after a failed setup, return false.
    pub fn begin_setup(&mut self) -> bool {
        !std::mem::replace(&mut self.setup_attempted, true)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, DemoState::Running { .. })
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Report a setup failure that happens before `start`
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status.show(message);
    }

    /// Leave Idle: open the camera, load the overlay, start the worker.
    ///
    /// On camera failure the demo stays Idle and shows
    /// [`CAMERA_FAILURE_MESSAGE`]. Calling this while running does nothing.
    pub fn start<S, F>(&mut self, settings: &Settings, segmenter: S, open_camera: F) -> Result<(), SetupError>
    where
        S: PartSegmenter + 'static,
        F: FnOnce(&VideoConstraints, Option<&str>) -> Result<Box<dyn FrameSource>, CameraError>,
    {
        if self.is_running() {
            log::warn!("Demo already running");
            return Ok(());
        }

        // Model is ready at this point
        self.status.hide();

        let label = settings.camera_label.as_deref();
        let constraints = constraints_for_label(label, settings.camera_width, is_mobile());
        let camera = match open_camera(&constraints, label) {
            Ok(camera) => camera,
            Err(e) => {
                log::error!("Camera setup failed: {}", e);
                self.status.show(CAMERA_FAILURE_MESSAGE);
                return Err(e.into());
            }
        };

        let overlay = if settings.effect.needs_overlay() {
            Some(load_overlay_image(&settings.face_image)?)
        } else {
            None
        };

        let pipeline = FramePipeline::new(
            segmenter,
            settings.effect,
            settings.segmentation_params(),
            EffectContext::new(overlay),
        );
        let stage = InferenceStage::spawn(pipeline)?;

        log::info!("Demo running with effect {:?}", settings.effect);
        self.state = DemoState::Running {
            camera,
            stage,
            last_submitted: 0,
        };
        Ok(())
    }

    /// One render-loop step: collect the finished frame, then submit the
    /// newest camera frame if the stage is free.
    pub fn tick(&mut self) -> Option<ProcessedFrame> {
        let DemoState::Running {
            camera,
            stage,
            last_submitted,
        } = &mut self.state
        else {
            return None;
        };

        let finished = match stage.poll() {
            Some(Ok(frame)) => Some(frame),
            Some(Err(e)) => {
                log::warn!("Segmentation failed: {}", e);
                None
            }
            None => None,
        };

        if !stage.is_busy() {
            if let Some(frame) = camera.latest_frame() {
                if frame.frame_number > *last_submitted && stage.submit(frame.image, frame.frame_number) {
                    *last_submitted = frame.frame_number;
                }
            }
        }

        finished
    }
}
