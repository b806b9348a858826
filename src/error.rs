use thiserror::Error;

/// Unrecoverable engine failures
///
/// Backend errors never show up here; they are absorbed by the engine.
#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("fallback mask is {mask_width}x{mask_height} for a {frame_width}x{frame_height} frame")]
    MaskMismatch {
        mask_width: u32,
        mask_height: u32,
        frame_width: u32,
        frame_height: u32,
    },

    #[error("segmentation engine has failed")]
    Failed,
}

/// Errors raised by a pipeline tick
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("capture failed: {0:#}")]
    Capture(anyhow::Error),

    #[error("output surface failed: {0:#}")]
    Surface(anyhow::Error),

    #[error(transparent)]
    Segmentation(#[from] SegmentationError),
}

impl PipelineError {
    /// Fatal errors stop the scheduler; everything else costs one frame
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Segmentation(_))
    }
}
