use image::{GrayImage, RgbaImage};
use std::time::Duration;

/// Camera frame: RGBA pixels, row-major
pub type Frame = RgbaImage;

/// Per-pixel opacity: 0 = background, 255 = subject
/// Dimensions match the frame the mask was computed from
pub type Mask = GrayImage;

/// Output of one segmentation attempt
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    /// Refined mask, same dimensions as `source`
    pub mask: Mask,
    /// The frame the mask was computed from
    pub source: Frame,
    /// `source` with `mask` applied as alpha
    pub subject: Frame,
    /// Which path produced the raw mask
    pub path: SegmentationPath,
}

impl SegmentationResult {
    /// Fraction of mask pixels that are not fully transparent
    pub fn coverage(&self) -> f32 {
        let total = self.mask.as_raw().len();
        if total == 0 {
            return 0.0;
        }
        let opaque = self.mask.as_raw().iter().filter(|&&v| v > 0).count();
        opaque as f32 / total as f32
    }
}

/// Which segmentation variant answered a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationPath {
    /// The primary model backend
    Model,
    /// The color heuristic
    Heuristic,
}

/// Structured failure category reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Handshake / model load failed
    Init,
    /// Frame timestamp was not strictly greater than the previous one
    StaleTimestamp,
    /// Out of memory or a failed allocation
    ResourceExhausted,
    /// The backend produced output that cannot be used as a mask
    InvalidOutput,
    /// No structured kind available; classified from the message
    Unclassified,
}

/// Error raised by a primary segmentation backend
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn init(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Init, message)
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Unclassified, message)
    }
}

/// Pluggable model-based segmentation capability
///
/// Implementations may keep temporal state between frames and may require
/// strictly increasing timestamps.
#[allow(async_fn_in_trait)]
pub trait PrimaryBackend {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Load the model and prepare for inference
    async fn init(&mut self) -> Result<(), BackendError>;

    /// Produce an opacity mask for `frame`
    ///
    /// The returned mask should match the frame's dimensions; a mismatch is
    /// treated by the engine as an invalid result.
    async fn infer(&mut self, frame: &Frame, timestamp: Duration) -> Result<Mask, BackendError>;

    /// Release the model; `init` may be called again afterwards
    fn dispose(&mut self);
}
