use super::placement::PlacementRect;
use crate::segmentation::Frame;
use anyhow::Result;
use image::{imageops, Rgba, RgbaImage};

/// Drawable target for the subject overlay
pub trait OutputSurface {
    /// Current size in pixels; (0, _) or (_, 0) means not laid out yet
    fn dimensions(&self) -> (u32, u32);

    /// Remove the previous overlay
    fn clear(&mut self);

    /// Draw `subject` scaled into `rect` with normal alpha-over compositing
    fn draw(&mut self, subject: &Frame, rect: PlacementRect, opacity: f32) -> Result<()>;

    /// Make the drawn overlay visible, for surfaces that need an explicit flush
    fn present(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Transparent RGBA layer the subject is drawn onto
pub struct OverlayCanvas {
    layer: RgbaImage,
}

impl OverlayCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            layer: RgbaImage::new(width, height),
        }
    }

    pub fn layer(&self) -> &RgbaImage {
        &self.layer
    }

    /// Match a new surface size; the layer is cleared
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.layer.dimensions() != (width, height) {
            tracing::debug!("Resizing overlay layer to {}x{}", width, height);
            self.layer = RgbaImage::new(width, height);
        }
    }

    /// Composite the layer over `background`
    pub fn composite_over(&self, background: &RgbaImage) -> RgbaImage {
        let mut out = background.clone();
        imageops::overlay(&mut out, &self.layer, 0, 0);
        out
    }
}

impl OutputSurface for OverlayCanvas {
    fn dimensions(&self) -> (u32, u32) {
        self.layer.dimensions()
    }

    fn clear(&mut self) {
        self.layer.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
    }

    fn draw(&mut self, subject: &Frame, rect: PlacementRect, opacity: f32) -> Result<()> {
        let _span = tracing::debug_span!("draw").entered();

        let mut scaled = if subject.dimensions() == (rect.width, rect.height) {
            subject.clone()
        } else {
            imageops::resize(
                subject,
                rect.width,
                rect.height,
                imageops::FilterType::Triangle,
            )
        };

        let opacity = opacity.clamp(0.0, 1.0);
        if opacity < 1.0 {
            for pixel in scaled.pixels_mut() {
                pixel[3] = (pixel[3] as f32 * opacity).round() as u8;
            }
        }

        imageops::overlay(&mut self.layer, &scaled, rect.x, rect.y);
        Ok(())
    }
}
