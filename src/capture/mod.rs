mod still;
mod v4l_capture;

pub use still::StillImageCapture;
pub use v4l_capture::WebcamCapture;

use crate::segmentation::Frame;
use anyhow::Result;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture the current frame as RGBA
    fn capture_frame(&mut self) -> Result<Frame>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}
