mod classifier;
mod engine;
mod onnx;
mod preprocess;
mod refine;
mod state;
pub mod types;

pub use classifier::{rgb_to_hsv, ColorMaskClassifier};
pub use engine::{apply_mask, SegmentationEngine};
pub use onnx::OnnxSelfieSegmenter;
pub use preprocess::{Preprocessor, TensorLayout};
pub use refine::{gaussian_blur, MaskRefiner};
pub use state::{EngineState, FailureKind, InitStep, Route, StateMachine, Thresholds, Verdict};
pub use types::{
    BackendError, BackendErrorKind, Frame, Mask, PrimaryBackend, SegmentationPath,
    SegmentationResult,
};

use std::path::Path;

/// Create the default model backend (MediaPipe-style selfie segmenter)
pub fn create_default_backend(
    model_path: &Path,
    input_size: (u32, u32),
    layout: TensorLayout,
) -> OnnxSelfieSegmenter {
    OnnxSelfieSegmenter::new(model_path, input_size, layout)
}
