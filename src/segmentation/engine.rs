use super::classifier::ColorMaskClassifier;
use super::refine::MaskRefiner;
use super::state::{EngineState, FailureKind, InitStep, Route, StateMachine, Verdict};
use super::types::{
    BackendError, BackendErrorKind, Frame, Mask, PrimaryBackend, SegmentationPath,
    SegmentationResult,
};
use crate::config::{EngineConfig, PipelineConfig};
use crate::error::SegmentationError;
use image::{imageops, Rgba};
use std::borrow::Cow;
use std::time::{Duration, Instant};

/// Strictly increasing per-frame timestamps
#[derive(Debug)]
struct FrameClock {
    origin: Instant,
    last: Option<Duration>,
}

impl FrameClock {
    const MIN_STEP: Duration = Duration::from_millis(1);

    fn new() -> Self {
        Self {
            origin: Instant::now(),
            last: None,
        }
    }

    fn next(&mut self) -> Duration {
        let elapsed = self.origin.elapsed();
        let timestamp = match self.last {
            Some(last) if elapsed < last + Self::MIN_STEP => last + Self::MIN_STEP,
            _ => elapsed,
        };
        self.last = Some(timestamp);
        timestamp
    }
}

/// Model variant: the primary backend behind input limits and a frame clock
struct ModelBackend<B> {
    backend: B,
    clock: FrameClock,
}

impl<B: PrimaryBackend> ModelBackend<B> {
    fn new(backend: B) -> Self {
        Self {
            backend,
            clock: FrameClock::new(),
        }
    }

    async fn init(&mut self) -> Result<(), BackendError> {
        self.backend.init().await
    }

    async fn segment(&mut self, frame: &Frame, max_dimension: u32) -> Result<Mask, BackendError> {
        let input = limit_dimensions(frame, max_dimension);
        let timestamp = self.clock.next();
        let mask = self.backend.infer(&input, timestamp).await?;

        if mask.dimensions() != input.dimensions() {
            return Err(BackendError::new(
                BackendErrorKind::InvalidOutput,
                format!(
                    "mask is {:?} for a {:?} input",
                    mask.dimensions(),
                    input.dimensions()
                ),
            ));
        }

        let (width, height) = frame.dimensions();
        if mask.dimensions() == (width, height) {
            Ok(mask)
        } else {
            Ok(imageops::resize(&mask, width, height, imageops::FilterType::Triangle))
        }
    }

    fn dispose(&mut self) {
        self.backend.dispose();
    }
}

/// Heuristic variant: the color classifier, which cannot fail
struct HeuristicBackend {
    classifier: ColorMaskClassifier,
}

impl HeuristicBackend {
    fn segment(&self, frame: &Frame) -> Mask {
        self.classifier.classify(frame)
    }
}

/// Downscale so the longest side is at most `max_dimension`
fn limit_dimensions(frame: &Frame, max_dimension: u32) -> Cow<'_, Frame> {
    let (width, height) = frame.dimensions();
    let longest = width.max(height);
    if longest <= max_dimension || max_dimension == 0 {
        return Cow::Borrowed(frame);
    }

    let scale = max_dimension as f32 / longest as f32;
    let new_width = ((width as f32 * scale).round() as u32).max(1);
    let new_height = ((height as f32 * scale).round() as u32).max(1);
    Cow::Owned(imageops::resize(
        frame,
        new_width,
        new_height,
        imageops::FilterType::Triangle,
    ))
}

/// Apply `mask` as alpha: each output alpha is the source alpha scaled by
/// the mask, so it never exceeds the mask value
pub fn apply_mask(frame: &Frame, mask: &Mask) -> Frame {
    assert_eq!(
        frame.dimensions(),
        mask.dimensions(),
        "mask and frame dimensions must match"
    );

    let mut subject = frame.clone();
    for (pixel, m) in subject.pixels_mut().zip(mask.pixels()) {
        let alpha = (pixel[3] as u16 * m[0] as u16 + 127) / 255;
        *pixel = Rgba([pixel[0], pixel[1], pixel[2], alpha as u8]);
    }
    subject
}

/// Produces a subject mask for every frame, whatever state the model is in
///
/// The engine owns the model backend and all of its failure bookkeeping.
/// Backend errors are absorbed here: the caller always gets a result unless
/// the heuristic path itself is broken.
pub struct SegmentationEngine<B> {
    machine: StateMachine,
    model: Option<ModelBackend<B>>,
    heuristic: HeuristicBackend,
    refiner: MaskRefiner,
    config: EngineConfig,
    max_dimension: u32,
}

impl<B: PrimaryBackend> SegmentationEngine<B> {
    pub fn new(backend: B, config: &PipelineConfig) -> Self {
        Self::build(Some(backend), config)
    }

    /// An engine without a model; every frame goes through the classifier
    pub fn heuristic_only(config: &PipelineConfig) -> Self {
        Self::build(None, config)
    }

    fn build(backend: Option<B>, config: &PipelineConfig) -> Self {
        let thresholds = config.engine.thresholds.clone();
        let machine = if backend.is_some() {
            StateMachine::new(thresholds)
        } else {
            StateMachine::heuristic_only(thresholds)
        };

        Self {
            machine,
            model: backend.map(ModelBackend::new),
            heuristic: HeuristicBackend {
                classifier: ColorMaskClassifier::new(config.skin.clone()),
            },
            refiner: MaskRefiner::new(config.refine.clone()),
            config: config.engine.clone(),
            max_dimension: config.engine.max_processed_dimension,
        }
    }

    pub fn state(&self) -> EngineState {
        self.machine.state()
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Current limit on the longest side of frames sent to the model
    pub fn max_processed_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Segment one frame
    pub async fn segment(&mut self, frame: &Frame) -> Result<SegmentationResult, SegmentationError> {
        if self.machine.state() == EngineState::Failed {
            return Err(SegmentationError::Failed);
        }

        if self.machine.take_reset() {
            tracing::info!("Resetting segmentation backend after repeated timestamp anomalies");
            if let Some(model) = self.model.as_mut() {
                model.dispose();
            }
        }

        // Loading here means an earlier call was dropped mid-init
        if self.machine.needs_init() {
            self.machine.begin_loading();
            self.initialize().await;
        }

        let model_mask = match self.machine.route() {
            Route::Model => self.segment_with_model(frame).await,
            Route::Heuristic => None,
        };

        let (mask, path) = match model_mask {
            Some(raw) => (self.refiner.soften(&raw), SegmentationPath::Model),
            None => {
                let raw = self.heuristic.segment(frame);
                if raw.dimensions() != frame.dimensions() {
                    self.machine.fail();
                    tracing::error!("Fallback classifier produced a mismatched mask");
                    return Err(SegmentationError::MaskMismatch {
                        mask_width: raw.width(),
                        mask_height: raw.height(),
                        frame_width: frame.width(),
                        frame_height: frame.height(),
                    });
                }
                (self.refiner.refine(&raw), SegmentationPath::Heuristic)
            }
        };

        let subject = apply_mask(frame, &mask);
        Ok(SegmentationResult {
            mask,
            source: frame.clone(),
            subject,
            path,
        })
    }

    /// Run the init handshake with bounded retries
    async fn initialize(&mut self) {
        let Some(model) = self.model.as_mut() else {
            return;
        };

        tracing::info!("Initializing segmentation backend {}", model.backend.name());

        loop {
            match model.init().await {
                Ok(()) => {
                    self.machine.init_succeeded();
                    tracing::info!("Segmentation backend ready");
                    return;
                }
                Err(err) => match self.machine.init_failed() {
                    InitStep::Retry { attempt } => {
                        tracing::warn!(
                            "Backend init failed ({}), retry {}/{}",
                            err,
                            attempt,
                            self.config.thresholds.max_init_retries
                        );
                        tokio::time::sleep(self.config.init_retry_delay).await;
                    }
                    InitStep::Abandon => {
                        tracing::warn!(
                            "Backend init failed ({}); using color fallback for this session",
                            err
                        );
                        model.dispose();
                        return;
                    }
                },
            }
        }
    }

    /// One model inference; `None` means this frame falls back to the heuristic
    async fn segment_with_model(&mut self, frame: &Frame) -> Option<Mask> {
        let model = self.model.as_mut()?;

        let err = match model.segment(frame, self.max_dimension).await {
            Ok(mask) => {
                self.machine.inference_succeeded();
                return Some(mask);
            }
            Err(err) => err,
        };

        let kind = FailureKind::classify(&err);
        tracing::warn!("Backend inference failed ({:?}): {}", kind, err);

        if kind == FailureKind::ResourceExhausted {
            let shrunk = ((self.max_dimension as f32 * self.config.shrink_factor) as u32)
                .max(self.config.min_processed_dimension);
            if shrunk < self.max_dimension {
                tracing::warn!(
                    "Lowering max processed dimension {} -> {}",
                    self.max_dimension,
                    shrunk
                );
                self.max_dimension = shrunk;
            }
        }

        match self.machine.inference_failed(kind) {
            Verdict::Demoted => {
                tracing::warn!(
                    "{} consecutive backend failures; using color fallback for this session",
                    self.machine.thresholds().max_errors_before_fallback
                );
                model.dispose();
            }
            Verdict::ResetScheduled => {
                tracing::info!("Backend reset scheduled before next inference");
            }
            Verdict::Continue => {}
        }

        None
    }
}
