use super::OutputSink;
use crate::compositing::{OutputSurface, OverlayCanvas, PlacementRect};
use crate::segmentation::Frame;
use anyhow::{Context, Result};
use image::{imageops, Rgba, RgbaImage};
use std::path::Path;

/// What the subject is composited over
#[derive(Debug, Clone)]
pub enum Background {
    Solid(Rgba<u8>),
    Image(RgbaImage),
}

impl Background {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("Failed to open background image {}", path.display()))?
            .to_rgba8();
        Ok(Background::Image(image))
    }

    /// Render the background at the given output size
    pub fn render(&self, width: u32, height: u32) -> RgbaImage {
        match self {
            Background::Solid(color) => RgbaImage::from_pixel(width, height, *color),
            Background::Image(image) if image.dimensions() == (width, height) => image.clone(),
            Background::Image(image) => {
                imageops::resize(image, width, height, imageops::FilterType::Triangle)
            }
        }
    }
}

/// Output surface that composes the overlay over a background and writes
/// the result to a sink on every present
pub struct LoopbackSurface<O> {
    sink: O,
    background: RgbaImage,
    canvas: OverlayCanvas,
}

impl<O: OutputSink> LoopbackSurface<O> {
    pub fn new(sink: O, background: &Background) -> Self {
        let (width, height) = sink.resolution();
        Self {
            sink,
            background: background.render(width, height),
            canvas: OverlayCanvas::new(width, height),
        }
    }

    pub fn sink(&self) -> &O {
        &self.sink
    }
}

impl<O: OutputSink> OutputSurface for LoopbackSurface<O> {
    fn dimensions(&self) -> (u32, u32) {
        self.sink.resolution()
    }

    fn clear(&mut self) {
        let (width, height) = self.sink.resolution();
        self.canvas.resize(width, height);
        self.canvas.clear();
    }

    fn draw(&mut self, subject: &Frame, rect: PlacementRect, opacity: f32) -> Result<()> {
        self.canvas.draw(subject, rect, opacity)
    }

    fn present(&mut self) -> Result<()> {
        let composed = self.canvas.composite_over(&self.background);
        self.sink.write_frame(&composed)
    }
}
