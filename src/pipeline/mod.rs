//! Per-frame processing
//!
//! [`FramePipeline`] runs one iteration: segment, extract boxes, draw the
//! frame, apply the effect. [`InferenceStage`] runs the pipeline on a worker
//! thread with room for exactly one frame in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use image::RgbaImage;

use crate::compositor::{Canvas, CompositeError, EffectContext};
use crate::effects::Effect;
use crate::geometry::{part_bounding_boxes, PartBoxes};
use crate::ml::{OutputStride, PartSegmenter, SegmentationError};

/// Segmentation call parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentationParams {
    pub output_stride: OutputStride,
    pub segmentation_threshold: f32,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            output_stride: OutputStride::Eight,
            segmentation_threshold: 0.5,
        }
    }
}

/// A composited frame
pub struct ProcessedFrame {
    pub image: RgbaImage,
    pub boxes: PartBoxes,
    pub frame_number: u64,
}

/// Segment → boxes → composite, for one frame at a time
pub struct FramePipeline<S: PartSegmenter> {
    segmenter: S,
    effect: Effect,
    params: SegmentationParams,
    context: EffectContext,
    canvas: Canvas,
}

impl<S: PartSegmenter> FramePipeline<S> {
    pub fn new(segmenter: S, effect: Effect, params: SegmentationParams, context: EffectContext) -> Self {
        Self {
            segmenter,
            effect,
            params,
            context,
            canvas: Canvas::new(0, 0),
        }
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    /// Run one iteration on `frame`
    pub fn process(&mut self, frame: &RgbaImage, frame_number: u64) -> Result<ProcessedFrame, SegmentationError> {
        let segmentation = self.segmenter.segment_parts(
            frame,
            self.params.output_stride,
            self.params.segmentation_threshold,
        )?;
        let boxes = part_bounding_boxes(&segmentation);
        log::trace!("Frame {}: {} parts detected", frame_number, boxes.len());

        self.canvas.draw_frame(frame);
        match self.effect.apply(&mut self.context, &mut self.canvas, &boxes) {
            Ok(()) => {}
            Err(e @ CompositeError::PartNotDetected(_)) => {
                log::debug!("Frame {}: effect skipped: {}", frame_number, e);
            }
            Err(e) => {
                log::warn!("Frame {}: effect failed: {}", frame_number, e);
            }
        }

        Ok(ProcessedFrame {
            image: self.canvas.image().clone(),
            boxes,
            frame_number,
        })
    }

    /// Release offscreen surfaces
    pub fn teardown(&mut self) {
        self.context.teardown();
    }
}

struct StageInput {
    image: RgbaImage,
    frame_number: u64,
}

/// Single-slot worker stage.
///
/// At most one frame is being processed at any time; `submit` refuses new
/// work until the previous result has been taken with `poll`.
pub struct InferenceStage {
    input: Option<Sender<StageInput>>,
    output: Receiver<Result<ProcessedFrame, SegmentationError>>,
    busy: bool,
    running: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl InferenceStage {
    /// Move `pipeline` onto a worker thread
    pub fn spawn<S: PartSegmenter + 'static>(mut pipeline: FramePipeline<S>) -> std::io::Result<Self> {
        let (input_sender, input_receiver) = crossbeam_channel::bounded::<StageInput>(1);
        let (output_sender, output_receiver) = crossbeam_channel::bounded(1);
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let thread_handle = std::thread::Builder::new()
            .name("part-segmentation".to_string())
            .spawn(move || {
                log::info!("Segmentation worker started ({:?})", pipeline.effect());
                while let Ok(input) = input_receiver.recv() {
                    let result = pipeline.process(&input.image, input.frame_number);
                    if output_sender.send(result).is_err() {
                        break;
                    }
                }
                pipeline.teardown();
                running_clone.store(false, Ordering::Release);
                log::info!("Segmentation worker stopped");
            })?;

        Ok(Self {
            input: Some(input_sender),
            output: output_receiver,
            busy: false,
            running,
            thread_handle: Some(thread_handle),
        })
    }

    /// Whether a frame is in flight
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Whether the worker can still take frames
    pub fn is_running(&self) -> bool {
        self.input.is_some() && self.running.load(Ordering::Acquire)
    }

    /// Hand a frame to the worker. Returns `false` when the slot is occupied
    /// or the worker has stopped.
    pub fn submit(&mut self, image: RgbaImage, frame_number: u64) -> bool {
        if self.busy {
            return false;
        }
        let Some(input) = &self.input else {
            return false;
        };

        match input.try_send(StageInput { image, frame_number }) {
            Ok(()) => {
                self.busy = true;
                true
            }
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                self.worker_lost();
                false
            }
        }
    }

    /// Take the finished frame, if any. Frees the slot.
    pub fn poll(&mut self) -> Option<Result<ProcessedFrame, SegmentationError>> {
        match self.output.try_recv() {
            Ok(result) => {
                self.busy = false;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.worker_lost();
                None
            }
        }
    }

    fn worker_lost(&mut self) {
        if self.input.take().is_some() {
            log::warn!("Segmentation worker exited unexpectedly");
        }
        self.busy = false;
    }

    /// Block until the in-flight frame finishes
    pub fn wait(&mut self) -> Option<Result<ProcessedFrame, SegmentationError>> {
        if !self.busy {
            return None;
        }
        let result = self.output.recv().ok();
        self.busy = false;
        result
    }

    /// Stop the worker and wait for it to exit
    pub fn stop(&mut self) {
        // Dropping the sender ends the worker loop
        self.input = None;
        // Unblock a worker waiting to hand back a result
        while self.output.try_recv().is_ok() {}
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        self.busy = false;
    }
}

impl Drop for InferenceStage {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{BodyPart, PartSegmentation};
    use image::Rgba;

    /// Labels the left half of the frame as one part, the right half as another
    struct HalvesSegmenter {
        left: BodyPart,
        right: Option<BodyPart>,
        calls: usize,
    }

    impl PartSegmenter for HalvesSegmenter {
        fn segment_parts(
            &mut self,
            frame: &RgbaImage,
            _output_stride: OutputStride,
            _segmentation_threshold: f32,
        ) -> Result<PartSegmentation, SegmentationError> {
            self.calls += 1;
            let (w, h) = frame.dimensions();
            let data = (0..w * h)
                .map(|i| {
                    if i % w < w / 2 {
                        self.left.index() as i32
                    } else {
                        self.right.map(|p| p.index() as i32).unwrap_or(-1)
                    }
                })
                .collect();
            PartSegmentation::new(data, w, h)
        }
    }

    struct FailingSegmenter;

    impl PartSegmenter for FailingSegmenter {
        fn segment_parts(
            &mut self,
            _frame: &RgbaImage,
            _output_stride: OutputStride,
            _segmentation_threshold: f32,
        ) -> Result<PartSegmentation, SegmentationError> {
            Err(SegmentationError::Inference("no model".to_string()))
        }
    }

    fn two_tone(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    fn swap_pipeline(right: Option<BodyPart>) -> FramePipeline<HalvesSegmenter> {
        FramePipeline::new(
            HalvesSegmenter {
                left: BodyPart::LeftHand,
                right,
                calls: 0,
            },
            Effect::SwapParts {
                a: BodyPart::LeftHand,
                b: BodyPart::RightHand,
            },
            SegmentationParams::default(),
            EffectContext::with_seed(None, 3),
        )
    }

    #[test]
    fn test_pipeline_swaps_detected_parts() {
        let frame = two_tone(8, 4);
        let mut pipeline = swap_pipeline(Some(BodyPart::RightHand));
        let out = pipeline.process(&frame, 1).unwrap();

        assert_eq!(out.boxes.len(), 2);
        // Boxes are exclusive of their right/bottom edge, so the interior swaps
        assert_eq!(out.image.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(out.image.get_pixel(4, 0).0, [255, 0, 0, 255]);
        assert_eq!(out.frame_number, 1);
    }

    #[test]
    fn test_pipeline_missing_part_shows_base_frame() {
        let frame = two_tone(8, 4);
        let mut pipeline = swap_pipeline(None);
        let out = pipeline.process(&frame, 2).unwrap();
        assert_eq!(out.boxes.len(), 1);
        assert_eq!(out.image, frame);
    }

    #[test]
    fn test_pipeline_propagates_segmentation_error() {
        let mut pipeline = FramePipeline::new(
            FailingSegmenter,
            Effect::BoundingBoxes,
            SegmentationParams::default(),
            EffectContext::with_seed(None, 3),
        );
        assert!(pipeline.process(&two_tone(2, 2), 1).is_err());
    }

    #[test]
    fn test_stage_holds_one_frame() {
        let mut stage = InferenceStage::spawn(swap_pipeline(Some(BodyPart::RightHand))).unwrap();
        assert!(stage.submit(two_tone(8, 4), 1));
        assert!(stage.is_busy());
        assert!(!stage.submit(two_tone(8, 4), 2));

        let out = stage.wait().unwrap().unwrap();
        assert_eq!(out.frame_number, 1);
        assert!(!stage.is_busy());

        assert!(stage.submit(two_tone(8, 4), 3));
        let out = stage.wait().unwrap().unwrap();
        assert_eq!(out.frame_number, 3);
        assert!(stage.poll().is_none());
    }

    #[test]
    fn test_stage_poll_eventually_returns() {
        let mut stage = InferenceStage::spawn(swap_pipeline(None)).unwrap();
        assert!(stage.poll().is_none());
        assert!(stage.submit(two_tone(4, 4), 9));

        let result = loop {
            if let Some(result) = stage.poll() {
                break result;
            }
            std::thread::yield_now();
        };
        assert_eq!(result.unwrap().frame_number, 9);
        assert!(stage.submit(two_tone(4, 4), 10));
    }

    struct PanickingSegmenter;

    impl PartSegmenter for PanickingSegmenter {
        fn segment_parts(
            &mut self,
            _frame: &RgbaImage,
            _output_stride: OutputStride,
            _segmentation_threshold: f32,
        ) -> Result<PartSegmentation, SegmentationError> {
            panic!("segmenter crashed");
        }
    }

    #[test]
    fn test_stage_reports_dead_worker_as_stopped() {
        let pipeline = FramePipeline::new(
            PanickingSegmenter,
            Effect::BoundingBoxes,
            SegmentationParams::default(),
            EffectContext::with_seed(None, 3),
        );
        let mut stage = InferenceStage::spawn(pipeline).unwrap();
        assert!(stage.submit(two_tone(4, 4), 1));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while stage.is_running() {
            assert!(stage.poll().is_none());
            assert!(std::time::Instant::now() < deadline, "worker loss not detected");
            std::thread::yield_now();
        }

        assert!(!stage.is_busy());
        assert!(!stage.submit(two_tone(4, 4), 2));
        assert!(stage.poll().is_none());
    }

    #[test]
    fn test_stage_stop() {
        let mut stage = InferenceStage::spawn(swap_pipeline(None)).unwrap();
        assert!(stage.submit(two_tone(4, 4), 1));
        stage.stop();
        assert!(!stage.is_running());
        assert!(!stage.submit(two_tone(4, 4), 2));
    }
}
