//! Camera capture module
//!
//! Provides cross-platform camera capture using the nokhwa crate.
//! Captures frames on a background thread and provides the latest frame
//! to the main render thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::RgbaImage;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use parking_lot::Mutex;

/// Camera errors
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("Video capture is not available on this platform")]
    Unsupported,
    #[error("No camera found")]
    NoDevice,
    #[error("Failed to open camera: {0}")]
    Open(String),
}

/// Which way the camera faces
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FacingMode {
    /// Front camera, facing the user
    User,
    /// Rear camera
    Environment,
}

/// Derive the facing mode from a device label
pub fn facing_mode_for_label(label: Option<&str>) -> FacingMode {
    match label {
        Some(label) if label.to_lowercase().contains("back") => FacingMode::Environment,
        _ => FacingMode::User,
    }
}

/// Whether we are running on a phone or tablet
pub fn is_mobile() -> bool {
    cfg!(any(target_os = "android", target_os = "ios"))
}

/// Requested stream parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoConstraints {
    /// Audio is never captured
    pub audio: bool,
    /// Requested frame width
    pub width: u32,
    /// Facing hint, only set for labeled cameras on mobile
    pub facing_mode: Option<FacingMode>,
}

/// Build constraints for an optional camera label
pub fn constraints_for_label(label: Option<&str>, width: u32, mobile: bool) -> VideoConstraints {
    let facing_mode = match label {
        Some(_) if mobile => Some(facing_mode_for_label(label)),
        _ => None,
    };

    VideoConstraints {
        audio: false,
        width,
        facing_mode,
    }
}

/// Camera frame data
#[derive(Clone)]
pub struct CameraFrame {
    /// RGBA pixels
    pub image: RgbaImage,
    /// Frame number
    pub frame_number: u64,
    /// Frame timestamp
    pub timestamp: Instant,
}

/// Information about an available camera
#[derive(Clone, Debug)]
pub struct CameraInfo {
    /// Camera index
    pub index: u32,
    /// Camera name
    pub name: String,
}

/// Pick a device by facing hint, then by label, then the first one.
///
/// A label that matches nothing is not an error.
fn select_camera(
    cameras: &[CameraInfo],
    label: Option<&str>,
    facing_mode: Option<FacingMode>,
) -> Result<u32, CameraError> {
    let first = cameras.first().ok_or(CameraError::NoDevice)?;

    if let Some(facing_mode) = facing_mode {
        if let Some(camera) = cameras
            .iter()
            .find(|c| facing_mode_for_label(Some(&c.name)) == facing_mode)
        {
            return Ok(camera.index);
        }
    }

    if let Some(label) = label {
        let wanted = label.to_lowercase();
        match cameras.iter().find(|c| c.name.to_lowercase().contains(&wanted)) {
            Some(camera) => return Ok(camera.index),
            None => log::warn!("No camera matching '{}', using {}", label, first.name),
        }
    }

    Ok(first.index)
}

/// Camera capture interface
pub struct CameraCapture {
    /// Current frame (latest captured) - triple buffered
    frames: [Arc<Mutex<Option<CameraFrame>>>; 3],
    /// Index of the latest complete frame
    latest_frame_idx: Arc<AtomicU64>,
    /// Whether capture is running
    running: Arc<AtomicBool>,
    /// Capture thread handle
    thread_handle: Option<std::thread::JoinHandle<()>>,
    /// Negotiated resolution
    width: u32,
    height: u32,
    /// Frame counter
    frame_count: Arc<AtomicU64>,
}

impl CameraCapture {
    /// List available cameras
    pub fn list_cameras() -> Result<Vec<CameraInfo>, CameraError> {
        let backend = nokhwa::native_api_backend().ok_or(CameraError::Unsupported)?;
        Self::query(backend)
    }

    fn query(backend: ApiBackend) -> Result<Vec<CameraInfo>, CameraError> {
        let camera_list = nokhwa::query(backend).map_err(|e| CameraError::Open(e.to_string()))?;
        Ok(camera_list
            .iter()
            .enumerate()
            .map(|(idx, info)| CameraInfo {
                index: idx as u32,
                name: info.human_name().to_string(),
            })
            .collect())
    }

    /// Open a camera and start capturing.
    ///
    /// Returns once the device stream is open, or with the reason it could
    /// not be opened.
    pub fn open(constraints: &VideoConstraints, label: Option<&str>) -> Result<Self, CameraError> {
        let backend = nokhwa::native_api_backend().ok_or(CameraError::Unsupported)?;
        let cameras = Self::query(backend)?;
        for camera in &cameras {
            log::debug!("Found camera {}: {}", camera.index, camera.name);
        }

        let camera_index = select_camera(&cameras, label, constraints.facing_mode)?;
        log::info!(
            "Opening camera {} (width {}, facing {:?})",
            camera_index,
            constraints.width,
            constraints.facing_mode
        );

        let frames: [Arc<Mutex<Option<CameraFrame>>>; 3] = [
            Arc::new(Mutex::new(None)),
            Arc::new(Mutex::new(None)),
            Arc::new(Mutex::new(None)),
        ];
        let latest_frame_idx = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));
        let frame_count = Arc::new(AtomicU64::new(0));
        let (opened_sender, opened_receiver) = crossbeam_channel::bounded(1);

        // Clone for the capture thread
        let frames_clone = frames.clone();
        let latest_frame_idx_clone = latest_frame_idx.clone();
        let running_clone = running.clone();
        let frame_count_clone = frame_count.clone();
        let requested_width = constraints.width;

        let thread_handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                let camera = match Self::open_device(camera_index, requested_width) {
                    Ok(camera) => camera,
                    Err(e) => {
                        let _ = opened_sender.send(Err(e));
                        return;
                    }
                };
                let resolution = camera.resolution();
                let _ = opened_sender.send(Ok((resolution.width(), resolution.height())));

                Self::capture_thread(
                    camera,
                    frames_clone,
                    latest_frame_idx_clone,
                    running_clone,
                    frame_count_clone,
                );
            })
            .map_err(|e| CameraError::Open(format!("Failed to spawn capture thread: {}", e)))?;

        let (width, height) = opened_receiver
            .recv()
            .map_err(|_| CameraError::Open("capture thread exited".to_string()))??;

        Ok(Self {
            frames,
            latest_frame_idx,
            running,
            thread_handle: Some(thread_handle),
            width,
            height,
            frame_count,
        })
    }

    /// Open the device, falling back through looser format requests
    fn open_device(camera_index: u32, width: u32) -> Result<Camera, CameraError> {
        let index = CameraIndex::Index(camera_index);
        let height = width * 3 / 4;

        let requests = [
            RequestedFormatType::Closest(CameraFormat::new(
                Resolution::new(width, height),
                FrameFormat::MJPEG,
                30,
            )),
            RequestedFormatType::HighestResolution(Resolution::new(640, 480)),
            RequestedFormatType::None,
        ];

        let mut last_error = None;
        for request in requests {
            let description = format!("{:?}", request);
            let requested = RequestedFormat::new::<RgbAFormat>(request);
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => {
                    camera
                        .open_stream()
                        .map_err(|e| CameraError::Open(format!("Failed to open camera stream: {}", e)))?;
                    log::info!(
                        "Camera opened: {} ({}x{})",
                        camera.info().human_name(),
                        camera.resolution().width(),
                        camera.resolution().height()
                    );
                    return Ok(camera);
                }
                Err(e) => {
                    log::warn!("Camera format request {} failed: {}", description, e);
                    last_error = Some(e);
                }
            }
        }

        Err(CameraError::Open(
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    /// Camera capture thread
    fn capture_thread(
        mut camera: Camera,
        frames: [Arc<Mutex<Option<CameraFrame>>>; 3],
        latest_frame_idx: Arc<AtomicU64>,
        running: Arc<AtomicBool>,
        frame_count: Arc<AtomicU64>,
    ) {
        log::info!("Camera capture thread started");

        let mut write_idx: u64 = 0;

        while running.load(Ordering::Acquire) {
            let frame = match camera.frame() {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("Failed to capture frame: {:?}", e);
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    continue;
                }
            };

            let decoded = match frame.decode_image::<RgbAFormat>() {
                Ok(decoded) => decoded,
                Err(e) => {
                    log::warn!("Failed to decode frame: {:?}", e);
                    continue;
                }
            };

            let (width, height) = (decoded.width(), decoded.height());
            let Some(image) = RgbaImage::from_raw(width, height, decoded.into_raw()) else {
                log::warn!("Decoded frame has wrong size for {}x{}", width, height);
                continue;
            };

            let camera_frame = CameraFrame {
                image,
                frame_number: frame_count.fetch_add(1, Ordering::Relaxed) + 1,
                timestamp: Instant::now(),
            };

            // Write to the next buffer slot
            let slot = (write_idx % 3) as usize;
            *frames[slot].lock() = Some(camera_frame);

            // Update latest frame index
            latest_frame_idx.store(write_idx, Ordering::Release);
            write_idx = write_idx.wrapping_add(1);
        }

        if let Err(e) = camera.stop_stream() {
            log::warn!("Failed to stop camera stream: {}", e);
        }
        log::info!("Camera capture thread stopped");
    }

    /// Get the latest captured frame
    pub fn latest_frame(&self) -> Option<CameraFrame> {
        let idx = self.latest_frame_idx.load(Ordering::Acquire);
        let slot = (idx % 3) as usize;
        self.frames[slot].lock().clone()
    }

    /// Check if capture is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get the camera resolution
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Stop capturing
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cameras(names: &[&str]) -> Vec<CameraInfo> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| CameraInfo {
                index: i as u32,
                name: name.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_facing_mode_for_label() {
        assert_eq!(facing_mode_for_label(None), FacingMode::User);
        assert_eq!(facing_mode_for_label(Some("Front Camera")), FacingMode::User);
        assert_eq!(facing_mode_for_label(Some("Back Camera")), FacingMode::Environment);
        assert_eq!(facing_mode_for_label(Some("camera2 0, facing BACK")), FacingMode::Environment);
    }

    #[test]
    fn test_constraints_only_hint_on_mobile() {
        let desktop = constraints_for_label(Some("Back Camera"), 600, false);
        assert_eq!(desktop.facing_mode, None);
        assert!(!desktop.audio);
        assert_eq!(desktop.width, 600);

        let mobile = constraints_for_label(Some("Back Camera"), 600, true);
        assert_eq!(mobile.facing_mode, Some(FacingMode::Environment));

        let unlabeled = constraints_for_label(None, 600, true);
        assert_eq!(unlabeled.facing_mode, None);
    }

    #[test]
    fn test_select_camera() {
        let list = cameras(&["FaceTime HD", "Back Camera"]);
        assert_eq!(select_camera(&list, None, None).unwrap(), 0);
        assert_eq!(select_camera(&list, Some("back"), None).unwrap(), 1);
        assert_eq!(
            select_camera(&list, None, Some(FacingMode::Environment)).unwrap(),
            1
        );
        assert!(matches!(
            select_camera(&[], None, None),
            Err(CameraError::NoDevice)
        ));
    }

    #[test]
    fn test_unmatched_label_falls_back_to_first_camera() {
        let list = cameras(&["FaceTime HD"]);
        let constraints = constraints_for_label(Some("Back Camera"), 600, false);
        assert_eq!(
            select_camera(&list, Some("Back Camera"), constraints.facing_mode).unwrap(),
            0
        );
        assert_eq!(select_camera(&list, Some("usb"), None).unwrap(), 0);
    }

    #[test]
    fn test_facing_hint_picks_device() {
        // Label names no device, but its facing hint does
        let list = cameras(&["Front Camera", "Rear (back) Camera"]);
        let constraints = constraints_for_label(Some("Back Camera"), 600, true);
        assert_eq!(
            select_camera(&list, Some("Back Camera"), constraints.facing_mode).unwrap(),
            1
        );

        // Front hint skips a back camera listed first
        let list = cameras(&["Back Camera", "Front Camera"]);
        let constraints = constraints_for_label(Some("Front Camera"), 600, true);
        assert_eq!(constraints.facing_mode, Some(FacingMode::User));
        assert_eq!(
            select_camera(&list, Some("Front Camera"), constraints.facing_mode).unwrap(),
            1
        );
    }
}
