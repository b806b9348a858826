//! Session configuration
//!
//! Everything here is fixed for the lifetime of a pipeline. The one exception
//! is the engine's processed-dimension limit, which the engine copies and may
//! lower on its own when the backend runs out of memory.

use crate::segmentation::Thresholds;
use std::ops::{Range, RangeInclusive};
use std::time::Duration;

/// HSV ranges classified as skin
///
/// Hue is in degrees, saturation and value in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct SkinToneThresholds {
    pub hue_low: RangeInclusive<f32>,
    pub hue_high: Range<f32>,
    pub saturation: RangeInclusive<f32>,
    pub value: RangeInclusive<f32>,
}

impl Default for SkinToneThresholds {
    fn default() -> Self {
        Self {
            hue_low: 0.0..=50.0,
            hue_high: 340.0..360.0,
            saturation: 0.1..=0.8,
            value: 0.2..=0.95,
        }
    }
}

impl SkinToneThresholds {
    pub fn matches(&self, hue: f32, saturation: f32, value: f32) -> bool {
        let hue_ok = self.hue_low.contains(&hue) || self.hue_high.contains(&hue);
        hue_ok && self.saturation.contains(&saturation) && self.value.contains(&value)
    }
}

/// Mask refinement parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RefineConfig {
    /// Blur radius of the first pass, in pixels (Gaussian sigma)
    pub blur_radius: f32,
    /// A neighbor above this value fills the pixel during dilation
    pub fill_threshold: u8,
    /// Nonzero pixels with fewer nonzero neighbors are erased
    pub min_neighbors: u8,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            blur_radius: 5.0,
            fill_threshold: 100,
            min_neighbors: 4,
        }
    }
}

/// Segmentation engine parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub thresholds: Thresholds,
    /// Fixed delay between backend init attempts
    pub init_retry_delay: Duration,
    /// Frames larger than this on their longest side are downscaled before
    /// they reach the backend
    pub max_processed_dimension: u32,
    /// Floor for adaptive downscaling
    pub min_processed_dimension: u32,
    /// Applied to `max_processed_dimension` on each resource-exhaustion error
    pub shrink_factor: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            init_retry_delay: Duration::from_millis(1000),
            max_processed_dimension: 640,
            min_processed_dimension: 160,
            shrink_factor: 0.75,
        }
    }
}

/// Where the subject is drawn on the output surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacementConfig {
    /// Subject height as a fraction of the output height
    pub scale: f32,
    pub anchor: Anchor,
    /// Horizontal distance from the anchored edge
    pub margin_x: u32,
    /// Vertical distance from the anchored edge
    pub margin_y: u32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            scale: 0.4,
            anchor: Anchor::BottomRight,
            margin_x: 20,
            margin_y: 10,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub skin: SkinToneThresholds,
    pub refine: RefineConfig,
    pub engine: EngineConfig,
    pub placement: PlacementConfig,
    /// Opacity of the subject layer in [0, 1]
    pub overlay_opacity: f32,
    /// Flip camera frames horizontally before segmentation
    pub mirror: bool,
    pub target_fps: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            skin: SkinToneThresholds::default(),
            refine: RefineConfig::default(),
            engine: EngineConfig::default(),
            placement: PlacementConfig::default(),
            overlay_opacity: 1.0,
            mirror: true,
            target_fps: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hue_wraps_around_red() {
        let skin = SkinToneThresholds::default();
        assert!(skin.matches(0.0, 0.5, 0.5));
        assert!(skin.matches(50.0, 0.5, 0.5));
        assert!(skin.matches(345.0, 0.5, 0.5));
        assert!(!skin.matches(51.0, 0.5, 0.5));
        assert!(!skin.matches(360.0, 0.5, 0.5));
        assert!(!skin.matches(200.0, 0.5, 0.5));
    }

    #[test]
    fn saturation_and_value_bounds_are_inclusive() {
        let skin = SkinToneThresholds::default();
        assert!(skin.matches(20.0, 0.1, 0.2));
        assert!(skin.matches(20.0, 0.8, 0.95));
        assert!(!skin.matches(20.0, 0.05, 0.5));
        assert!(!skin.matches(20.0, 0.5, 0.99));
    }
}
