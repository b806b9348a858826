use super::CaptureSource;
use crate::segmentation::Frame;
use anyhow::{Context, Result};
use std::path::Path;

/// Replays one image as every frame, for running without a camera
pub struct StillImageCapture {
    frame: Frame,
}

impl StillImageCapture {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let frame = image::open(path)
            .with_context(|| format!("Failed to open input image {}", path.display()))?
            .to_rgba8();

        tracing::info!(
            "Using still image {} ({}x{}) as capture source",
            path.display(),
            frame.width(),
            frame.height()
        );

        Ok(Self { frame })
    }

    pub fn from_frame(frame: Frame) -> Self {
        Self { frame }
    }
}

impl CaptureSource for StillImageCapture {
    fn capture_frame(&mut self) -> Result<Frame> {
        Ok(self.frame.clone())
    }

    fn resolution(&self) -> (u32, u32) {
        self.frame.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn every_capture_returns_the_same_frame() {
        let frame = Frame::from_pixel(3, 2, Rgba([1, 2, 3, 4]));
        let mut capture = StillImageCapture::from_frame(frame.clone());
        assert_eq!(capture.resolution(), (3, 2));
        assert_eq!(capture.capture_frame().unwrap(), frame);
        assert_eq!(capture.capture_frame().unwrap(), frame);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(StillImageCapture::open("/nonexistent/frame.png").is_err());
    }
}
