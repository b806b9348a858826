#![allow(dead_code)]

use camola_overlay::capture::CaptureSource;
use camola_overlay::compositing::{OutputSurface, PlacementRect};
use camola_overlay::config::PipelineConfig;
use camola_overlay::scheduler::Generation;
use camola_overlay::segmentation::{BackendError, Frame, Mask, PrimaryBackend};
use camola_overlay::status::{Status, StatusSink};
use image::{Luma, Rgba};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A frame the default skin thresholds classify as skin everywhere
pub fn skin_frame(width: u32, height: u32) -> Frame {
    Frame::from_pixel(width, height, Rgba([220, 170, 140, 255]))
}

/// Config with no delay between init retries
pub fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.engine.init_retry_delay = Duration::ZERO;
    config
}

/// What the scripted backend saw, shared with the test
#[derive(Debug, Default)]
pub struct BackendLog {
    pub init_calls: u32,
    pub infer_calls: u32,
    pub dispose_calls: u32,
    pub inputs: Vec<(u32, u32)>,
    pub timestamps: Vec<Duration>,
}

/// Primary backend driven by queued results
///
/// Each queue is consumed front to back; once empty, calls succeed and
/// inference returns an opaque mask matching the input.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    pub log: Arc<Mutex<BackendLog>>,
    init_results: Arc<Mutex<VecDeque<Result<(), BackendError>>>>,
    infer_results: Arc<Mutex<VecDeque<Result<Option<Mask>, BackendError>>>>,
    advance_on_infer: Option<Generation>,
    init_always_fails: bool,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_init() -> Self {
        Self {
            init_always_fails: true,
            ..Self::default()
        }
    }

    pub fn push_init(self, result: Result<(), BackendError>) -> Self {
        self.init_results.lock().unwrap().push_back(result);
        self
    }

    pub fn push_error(self, error: BackendError) -> Self {
        self.infer_results.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn push_success(self) -> Self {
        self.infer_results.lock().unwrap().push_back(Ok(None));
        self
    }

    pub fn push_mask(self, mask: Mask) -> Self {
        self.infer_results.lock().unwrap().push_back(Ok(Some(mask)));
        self
    }

    /// Advance `generation` during every inference, as a concurrent stop would
    pub fn advancing(mut self, generation: Generation) -> Self {
        self.advance_on_infer = Some(generation);
        self
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, BackendLog> {
        self.log.lock().unwrap()
    }
}

impl PrimaryBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn init(&mut self) -> Result<(), BackendError> {
        self.log.lock().unwrap().init_calls += 1;
        if self.init_always_fails {
            return Err(BackendError::init("model file missing"));
        }
        self.init_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn infer(&mut self, frame: &Frame, timestamp: Duration) -> Result<Mask, BackendError> {
        {
            let mut log = self.log.lock().unwrap();
            log.infer_calls += 1;
            log.inputs.push(frame.dimensions());
            log.timestamps.push(timestamp);
        }
        if let Some(generation) = &self.advance_on_infer {
            generation.advance();
        }

        let scripted = self.infer_results.lock().unwrap().pop_front();
        match scripted {
            Some(Err(err)) => Err(err),
            Some(Ok(Some(mask))) => Ok(mask),
            Some(Ok(None)) | None => {
                Ok(Mask::from_pixel(frame.width(), frame.height(), Luma([255])))
            }
        }
    }

    fn dispose(&mut self) {
        self.log.lock().unwrap().dispose_calls += 1;
    }
}

/// Capture source that replays queued results, then repeats a frame
pub struct ScriptedCapture {
    frame: Frame,
    queued: VecDeque<anyhow::Result<Frame>>,
    pub calls: u32,
}

impl ScriptedCapture {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            queued: VecDeque::new(),
            calls: 0,
        }
    }

    pub fn then(mut self, result: anyhow::Result<Frame>) -> Self {
        self.queued.push_back(result);
        self
    }
}

impl CaptureSource for ScriptedCapture {
    fn capture_frame(&mut self) -> anyhow::Result<Frame> {
        self.calls += 1;
        self.queued
            .pop_front()
            .unwrap_or_else(|| Ok(self.frame.clone()))
    }

    fn resolution(&self) -> (u32, u32) {
        self.frame.dimensions()
    }
}

/// Surface that records every call
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub size: (u32, u32),
    pub clears: u32,
    pub draws: Vec<(PlacementRect, (u32, u32), f32)>,
    pub last_subject: Option<Frame>,
    pub presents: u32,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            ..Self::default()
        }
    }
}

impl OutputSurface for RecordingSurface {
    fn dimensions(&self) -> (u32, u32) {
        self.size
    }

    fn clear(&mut self) {
        self.clears += 1;
    }

    fn draw(&mut self, subject: &Frame, rect: PlacementRect, opacity: f32) -> anyhow::Result<()> {
        self.draws.push((rect, subject.dimensions(), opacity));
        self.last_subject = Some(subject.clone());
        Ok(())
    }

    fn present(&mut self) -> anyhow::Result<()> {
        self.presents += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingStatus {
    pub seen: RefCell<Vec<Status>>,
}

impl StatusSink for RecordingStatus {
    fn notify(&self, status: &Status) {
        self.seen.borrow_mut().push(status.clone());
    }
}
