use super::types::{Frame, Mask};
use image::{imageops, Luma};
use ndarray::Array4;

/// Memory layout of the model's image input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TensorLayout {
    /// [1, 3, H, W]
    Nchw,
    /// [1, H, W, 3]
    #[default]
    Nhwc,
}

/// Converts frames to model input tensors and model output back to masks
#[derive(Debug, Clone)]
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
    layout: TensorLayout,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32, layout: TensorLayout) -> Self {
        Self {
            target_width,
            target_height,
            layout,
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Resize to the model's input size and normalize RGB to [0, 1]
    ///
    /// Alpha is dropped.
    pub fn preprocess(&self, frame: &Frame) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = if frame.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                frame,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            frame.clone()
        };

        let (w, h) = (self.target_width as usize, self.target_height as usize);
        let mut tensor = match self.layout {
            TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
            TensorLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
        };

        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                match self.layout {
                    TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
                    TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
                }
            }
        }

        tensor
    }
}

/// Pull the person-probability plane out of a raw model output
///
/// Handles single-channel outputs and two-class (background, person) outputs
/// in either planar or interleaved order. Returns `None` for any other size
/// or an unrecognized two-class layout.
pub fn person_plane(expected: usize, shape: &[i64], data: &[f32]) -> Option<Vec<f32>> {
    if data.len() == expected {
        return Some(data.to_vec());
    }

    if data.len() != expected * 2 || shape.len() != 4 {
        return None;
    }

    if shape[1] == 2 {
        Some(data[expected..].to_vec())
    } else if shape[3] == 2 {
        Some(data.chunks_exact(2).map(|pair| pair[1]).collect())
    } else {
        None
    }
}

/// True if values fall outside [0, 1] and need a sigmoid
pub fn looks_like_logits(values: &[f32]) -> bool {
    values.iter().any(|&v| !(-0.01..=1.01).contains(&v))
}

pub fn sigmoid_in_place(values: &mut [f32]) {
    for v in values {
        *v = 1.0 / (1.0 + (-*v).exp());
    }
}

/// Exponential smoothing between consecutive frames
///
/// `previous` is replaced when its size does not match `current`.
pub fn smooth_temporally(previous: &mut Vec<f32>, current: &[f32], smoothing: f32) {
    if previous.len() != current.len() {
        previous.clear();
        previous.extend_from_slice(current);
        return;
    }

    let keep = smoothing.clamp(0.0, 0.99);
    for (p, &c) in previous.iter_mut().zip(current) {
        *p = *p * keep + c * (1.0 - keep);
    }
}

/// Convert probabilities at model resolution into a mask at frame resolution
pub fn probabilities_to_mask(
    values: &[f32],
    width: u32,
    height: u32,
    target_width: u32,
    target_height: u32,
) -> Mask {
    let _span = tracing::debug_span!("postprocess").entered();

    let mask = Mask::from_fn(width, height, |x, y| {
        let idx = (y * width + x) as usize;
        Luma([(values[idx].clamp(0.0, 1.0) * 255.0).round() as u8])
    });

    if (width, height) == (target_width, target_height) {
        return mask;
    }

    imageops::resize(
        &mask,
        target_width,
        target_height,
        imageops::FilterType::Triangle,
    )
}
