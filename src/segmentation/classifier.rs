use super::types::{Frame, Mask};
use crate::config::SkinToneThresholds;
use image::Luma;

/// Skin-tone heuristic used when the model backend is unavailable
///
/// This is a color classifier, not a real foreground segmenter. It has no
/// external dependencies and always produces a mask.
#[derive(Debug, Clone, Default)]
pub struct ColorMaskClassifier {
    thresholds: SkinToneThresholds,
}

impl ColorMaskClassifier {
    pub fn new(thresholds: SkinToneThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &SkinToneThresholds {
        &self.thresholds
    }

    /// Classify every pixel of `frame` as subject (255) or background (0)
    pub fn classify(&self, frame: &Frame) -> Mask {
        let _span = tracing::debug_span!("color_classify").entered();

        let (width, height) = frame.dimensions();
        let mut mask = Mask::new(width, height);
        let mut subject_pixels = 0usize;

        for (src, dst) in frame.pixels().zip(mask.pixels_mut()) {
            let (h, s, v) = rgb_to_hsv(src[0], src[1], src[2]);
            if self.thresholds.matches(h, s, v) {
                *dst = Luma([255]);
                subject_pixels += 1;
            }
        }

        tracing::trace!(
            "Skin pixels: {}/{}",
            subject_pixels,
            width as usize * height as usize
        );

        mask
    }
}

/// Convert 8-bit RGB to HSV
///
/// Returns hue in degrees [0, 360), saturation and value in [0, 1].
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let sector = if delta == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };

    let mut hue = sector * 60.0;
    if hue >= 360.0 {
        hue -= 360.0;
    }

    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    (hue, saturation, max)
}
