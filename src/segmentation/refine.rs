use super::types::Mask;
use crate::config::RefineConfig;
use image::Luma;

const NEIGHBORS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Cleans up raw masks: hole filling, speckle removal and edge softening
///
/// Every operation allocates a new mask. Border pixels are never modified.
#[derive(Debug, Clone, Default)]
pub struct MaskRefiner {
    config: RefineConfig,
}

impl MaskRefiner {
    pub fn new(config: RefineConfig) -> Self {
        Self { config }
    }

    /// Full refinement: dilation, erosion, then the two-pass blur
    pub fn refine(&self, raw: &Mask) -> Mask {
        let _span = tracing::debug_span!("refine").entered();

        let dilated = self.dilate(raw);
        let eroded = self.erode(&dilated);
        self.soften(&eroded)
    }

    /// Two-pass blur only, radius R then max(1, R/2)
    ///
    /// Used for model masks, which are already free of speckle noise.
    pub fn soften(&self, mask: &Mask) -> Mask {
        let radius = self.config.blur_radius;
        if radius <= 0.0 {
            return mask.clone();
        }

        let first = gaussian_blur(mask, radius);
        let mut second = gaussian_blur(&first, (radius / 2.0).max(1.0));
        copy_border(mask, &mut second);
        second
    }

    /// Fill every interior pixel that touches a confident subject pixel
    pub fn dilate(&self, mask: &Mask) -> Mask {
        let mut out = mask.clone();
        let threshold = self.config.fill_threshold;

        for_each_interior(mask, |x, y| {
            let filled = NEIGHBORS
                .iter()
                .any(|&(dx, dy)| neighbor(mask, x, y, dx, dy) > threshold);
            if filled {
                out.put_pixel(x, y, Luma([255]));
            }
        });

        out
    }

    /// Erase interior pixels with too few nonzero neighbors
    pub fn erode(&self, mask: &Mask) -> Mask {
        let mut out = mask.clone();
        let min_neighbors = self.config.min_neighbors as usize;

        for_each_interior(mask, |x, y| {
            if mask.get_pixel(x, y)[0] == 0 {
                return;
            }
            let count = NEIGHBORS
                .iter()
                .filter(|&&(dx, dy)| neighbor(mask, x, y, dx, dy) > 0)
                .count();
            if count < min_neighbors {
                out.put_pixel(x, y, Luma([0]));
            }
        });

        out
    }
}

fn for_each_interior(mask: &Mask, mut f: impl FnMut(u32, u32)) {
    let (width, height) = mask.dimensions();
    if width < 3 || height < 3 {
        return;
    }
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            f(x, y);
        }
    }
}

fn neighbor(mask: &Mask, x: u32, y: u32, dx: i64, dy: i64) -> u8 {
    let nx = (x as i64 + dx) as u32;
    let ny = (y as i64 + dy) as u32;
    mask.get_pixel(nx, ny)[0]
}

fn copy_border(src: &Mask, dst: &mut Mask) {
    let (width, height) = src.dimensions();
    for y in 0..height {
        for x in 0..width {
            if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                dst.put_pixel(x, y, *src.get_pixel(x, y));
            }
        }
    }
}

fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil().max(1.0) as usize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=radius * 2)
        .map(|i| {
            let d = i as f32 - radius as f32;
            (-(d * d) / denom).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= sum);
    kernel
}

/// Separable Gaussian blur with clamp-to-edge sampling
pub fn gaussian_blur(mask: &Mask, sigma: f32) -> Mask {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 || sigma <= 0.0 {
        return mask.clone();
    }

    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as i64;
    let (w, h) = (width as i64, height as i64);
    let src = mask.as_raw();

    let mut horizontal = vec![0f32; src.len()];
    for y in 0..h {
        let row = (y * w) as usize;
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = (x + k as i64 - radius).clamp(0, w - 1) as usize;
                acc += src[row + sx] as f32 * weight;
            }
            horizontal[row + x as usize] = acc;
        }
    }

    let mut out = Mask::new(width, height);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = (y + k as i64 - radius).clamp(0, h - 1);
                acc += horizontal[(sy * w + x) as usize] * weight;
            }
            out.put_pixel(x as u32, y as u32, Luma([acc.round().clamp(0.0, 255.0) as u8]));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refiner() -> MaskRefiner {
        MaskRefiner::default()
    }

    fn border_values(mask: &Mask) -> Vec<u8> {
        let (w, h) = mask.dimensions();
        mask.enumerate_pixels()
            .filter(|(x, y, _)| *x == 0 || *y == 0 || *x == w - 1 || *y == h - 1)
            .map(|(_, _, p)| p[0])
            .collect()
    }

    #[test]
    fn isolated_pixel_is_eroded() {
        let mut mask = Mask::new(9, 9);
        mask.put_pixel(4, 4, Luma([255]));
        let eroded = refiner().erode(&mask);
        assert!(eroded.as_raw().iter().all(|&v| v == 0));
    }

    #[test]
    fn weak_isolated_pixel_is_removed_by_full_refine() {
        // Below the fill threshold, so dilation does not grow it
        let mut mask = Mask::new(12, 12);
        mask.put_pixel(6, 6, Luma([60]));
        let refined = refiner().refine(&mask);
        assert!(refined.as_raw().iter().all(|&v| v == 0));
    }

    #[test]
    fn dilation_fills_small_holes() {
        let mut mask = Mask::from_pixel(7, 7, Luma([255]));
        mask.put_pixel(3, 3, Luma([0]));
        let dilated = refiner().dilate(&mask);
        assert_eq!(dilated.get_pixel(3, 3)[0], 255);
    }

    #[test]
    fn dilation_ignores_weak_neighbors() {
        let mut mask = Mask::new(5, 5);
        mask.put_pixel(2, 2, Luma([100]));
        let dilated = refiner().dilate(&mask);
        assert_eq!(dilated.get_pixel(1, 1)[0], 0);
        assert_eq!(dilated.get_pixel(2, 2)[0], 100);
    }

    #[test]
    fn erosion_keeps_solid_regions() {
        let mut mask = Mask::new(10, 10);
        for y in 2..8 {
            for x in 2..8 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let eroded = refiner().erode(&mask);
        assert_eq!(eroded.get_pixel(4, 4)[0], 255);
        // Corner of the square has exactly three nonzero neighbors
        assert_eq!(eroded.get_pixel(2, 2)[0], 0);
        assert_eq!(eroded.get_pixel(3, 2)[0], 255);
    }

    #[test]
    fn border_is_copied_through() {
        let mask = Mask::from_fn(16, 12, |x, y| Luma([((x * 31 + y * 17) % 256) as u8]));
        let refined = refiner().refine(&mask);
        assert_eq!(refined.dimensions(), mask.dimensions());
        assert_eq!(border_values(&refined), border_values(&mask));
    }

    #[test]
    fn uniform_masks_are_fixed_points() {
        for value in [0u8, 255] {
            let mask = Mask::from_pixel(32, 24, Luma([value]));
            let once = refiner().refine(&mask);
            let twice = refiner().refine(&once);
            assert_eq!(once, mask);
            assert_eq!(twice, once);
        }
    }

    #[test]
    fn blur_softens_a_hard_edge() {
        let mask = Mask::from_fn(80, 10, |x, _| Luma([if x < 40 { 0 } else { 255 }]));
        let soft = refiner().soften(&mask);
        let edge = soft.get_pixel(39, 5)[0];
        assert!(edge > 0 && edge < 255, "edge value {edge}");
        assert_eq!(soft.get_pixel(3, 5)[0], 0);
        assert_eq!(soft.get_pixel(76, 5)[0], 255);
    }

    #[test]
    fn tiny_masks_pass_through_morphology() {
        let mask = Mask::from_pixel(2, 2, Luma([200]));
        assert_eq!(refiner().dilate(&mask), mask);
        assert_eq!(refiner().erode(&mask), mask);
    }
}
