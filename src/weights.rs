//! Precomputed Gaussian blur weights and their GPU buffers.
//!
//! A [`GaussianKernel`] is the one-sided half of a symmetric 1D kernel: `w[0]`
//! is the center tap and `w[i]` applies to both `-i` and `+i`. The same sequence
//! drives the horizontal and the vertical pass of a separable blur, which is what
//! turns an O(r²) 2D convolution into two O(r) passes.
//!
//! Weights are normalized so that `w[0] + 2 * sum(w[1..])` is exactly one. A
//! constant image therefore survives the blur unchanged.

use wgpu::util::DeviceExt;

use crate::gpu::GpuContext;

/// Radius and standard deviation of a Gaussian kernel, in texels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelConfig {
    pub radius: u32,
    pub sigma: f32,
}

impl KernelConfig {
    pub const fn new(radius: u32, sigma: f32) -> Self {
        Self { radius, sigma }
    }
}

/// One-sided normalized Gaussian weights.
#[derive(Clone, Debug, PartialEq)]
pub struct GaussianKernel {
    weights: Vec<f32>,
}

impl GaussianKernel {
    /// Sample a Gaussian at integer offsets `0..=radius` and normalize.
    ///
    /// A non-positive `sigma` degenerates to the identity kernel.
    pub fn new(config: KernelConfig) -> Self {
        if config.sigma <= 0.0 || config.radius == 0 {
            return Self { weights: vec![1.0] };
        }

        let two_sigma_sq = 2.0 * config.sigma * config.sigma;
        let raw: Vec<f64> = (0..=config.radius)
            .map(|i| (-((i * i) as f64) / two_sigma_sq as f64).exp())
            .collect();

        let total = raw[0] + 2.0 * raw[1..].iter().sum::<f64>();
        let weights = raw.iter().map(|w| (w / total) as f32).collect();

        Self { weights }
    }

    /// The one-sided weights, center first.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Number of distinct offsets sampled on each side, including the center.
    pub fn tap_count(&self) -> u32 {
        self.weights.len() as u32
    }
}

/// An immutable GPU copy of a [`GaussianKernel`].
///
/// Uploaded once as a read-only storage buffer and never written again.
pub struct WeightBuffer {
    buffer: wgpu::Buffer,
    kernel: GaussianKernel,
}

impl WeightBuffer {
    pub fn new(gpu: &GpuContext, label: &str, kernel: GaussianKernel) -> Self {
        let buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(kernel.weights()),
                usage: wgpu::BufferUsages::STORAGE,
            });
        Self { buffer, kernel }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn kernel(&self) -> &GaussianKernel {
        &self.kernel
    }

    pub fn tap_count(&self) -> u32 {
        self.kernel.tap_count()
    }
}

/// Which of the two weight sets a pass uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightSet {
    Thickness = 0,
    Depth = 1,
}

/// The pipeline's two weight buffers, created together and kept for its lifetime.
pub struct WeightBuffers {
    buffers: [WeightBuffer; 2],
}

impl WeightBuffers {
    pub fn new(gpu: &GpuContext, thickness: KernelConfig, depth: KernelConfig) -> Self {
        Self {
            buffers: [
                WeightBuffer::new(gpu, "Thickness Blur Weights", GaussianKernel::new(thickness)),
                WeightBuffer::new(gpu, "Depth Blur Weights", GaussianKernel::new(depth)),
            ],
        }
    }

    pub fn get(&self, set: WeightSet) -> &WeightBuffer {
        &self.buffers[set as usize]
    }
}

/// CPU mirror of the blur shaders: one axis of a clamp-to-edge convolution.
#[cfg(test)]
pub(crate) fn convolve_axis(
    image: &[f32],
    width: usize,
    height: usize,
    kernel: &GaussianKernel,
    horizontal: bool,
) -> Vec<f32> {
    let w = kernel.weights();
    let sample = |x: isize, y: isize| {
        let x = x.clamp(0, width as isize - 1) as usize;
        let y = y.clamp(0, height as isize - 1) as usize;
        image[y * width + x]
    };

    let mut out = vec![0.0; image.len()];
    for y in 0..height as isize {
        for x in 0..width as isize {
            let mut sum = sample(x, y) * w[0];
            for (i, weight) in w.iter().enumerate().skip(1) {
                let i = i as isize;
                let (a, b) = if horizontal {
                    (sample(x + i, y), sample(x - i, y))
                } else {
                    (sample(x, y + i), sample(x, y - i))
                };
                sum += (a + b) * weight;
            }
            out[y as usize * width + x as usize] = sum;
        }
    }
    out
}

/// CPU mirror of `depth_blur.wgsl`: like [`convolve_axis`], but zero pixels
/// stay zero and zero taps drop out of the weighted average.
#[cfg(test)]
pub(crate) fn convolve_covered_axis(
    image: &[f32],
    width: usize,
    height: usize,
    kernel: &GaussianKernel,
    horizontal: bool,
) -> Vec<f32> {
    let w = kernel.weights();
    let sample = |x: isize, y: isize| {
        let x = x.clamp(0, width as isize - 1) as usize;
        let y = y.clamp(0, height as isize - 1) as usize;
        image[y * width + x]
    };

    let mut out = vec![0.0; image.len()];
    for y in 0..height as isize {
        for x in 0..width as isize {
            let center = sample(x, y);
            if center <= 0.0 {
                continue;
            }
            let mut sum = center * w[0];
            let mut weight_sum = w[0];
            for (i, &weight) in w.iter().enumerate().skip(1) {
                let i = i as isize;
                let (a, b) = if horizontal {
                    (sample(x + i, y), sample(x - i, y))
                } else {
                    (sample(x, y + i), sample(x, y - i))
                };
                for tap in [a, b] {
                    if tap > 0.0 {
                        sum += tap * weight;
                        weight_sum += weight;
                    }
                }
            }
            out[y as usize * width + x as usize] = sum / weight_sum;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_sum(kernel: &GaussianKernel) -> f32 {
        let w = kernel.weights();
        w[0] + 2.0 * w[1..].iter().sum::<f32>()
    }

    #[test]
    fn kernel_is_normalized() {
        for config in [
            KernelConfig::new(1, 0.5),
            KernelConfig::new(8, 4.0),
            KernelConfig::new(10, 5.0),
            KernelConfig::new(32, 2.0),
        ] {
            let kernel = GaussianKernel::new(config);
            assert!((full_sum(&kernel) - 1.0).abs() < 1e-5, "{config:?}");
        }
    }

    #[test]
    fn kernel_decreases_away_from_center() {
        let kernel = GaussianKernel::new(KernelConfig::new(8, 4.0));
        assert_eq!(kernel.tap_count(), 9);
        for pair in kernel.weights().windows(2) {
            assert!(pair[0] > pair[1]);
        }
    }

    #[test]
    fn degenerate_kernel_is_identity() {
        let kernel = GaussianKernel::new(KernelConfig::new(5, 0.0));
        assert_eq!(kernel.weights(), &[1.0]);
        assert_eq!(kernel.tap_count(), 1);
    }

    #[test]
    fn constant_field_survives_separable_blur() {
        let (width, height) = (23, 17);
        let image = vec![0.75_f32; width * height];
        let kernel = GaussianKernel::new(KernelConfig::new(10, 5.0));

        let horizontal = convolve_axis(&image, width, height, &kernel, true);
        let blurred = convolve_axis(&horizontal, width, height, &kernel, false);

        for value in blurred {
            assert!((value - 0.75).abs() < 1e-5);
        }
    }

    #[test]
    fn separable_blur_preserves_total_away_from_edges() {
        let (width, height) = (41, 41);
        let mut image = vec![0.0_f32; width * height];
        image[20 * width + 20] = 1.0;
        let kernel = GaussianKernel::new(KernelConfig::new(6, 3.0));

        let horizontal = convolve_axis(&image, width, height, &kernel, true);
        let blurred = convolve_axis(&horizontal, width, height, &kernel, false);

        let total: f32 = blurred.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(blurred[20 * width + 20] < 1.0);
        assert!(blurred[20 * width + 26] > 0.0);
        assert_eq!(blurred[20 * width + 27], 0.0);
    }

    /// Front depths of a sphere of `radius` pixels whose nearest point is at
    /// view depth `near`, centered in a `size x size` image. Zero outside.
    fn sphere_depths(size: usize, radius: f32, near: f32) -> Vec<f32> {
        let c = (size as f32 - 1.0) / 2.0;
        let mut image = vec![0.0_f32; size * size];
        for y in 0..size {
            for x in 0..size {
                let (dx, dy) = ((x as f32 - c) / radius, (y as f32 - c) / radius);
                let r2 = dx * dx + dy * dy;
                if r2 <= 1.0 {
                    image[y * size + x] = near + 1.0 - (1.0 - r2).sqrt();
                }
            }
        }
        image
    }

    #[test]
    fn depth_smoothing_stays_within_splatted_range() {
        let size = 33;
        let image = sphere_depths(size, 8.0, 4.0);
        let kernel = GaussianKernel::new(KernelConfig::new(10, 5.0));

        let horizontal = convolve_covered_axis(&image, size, size, &kernel, true);
        let blurred = convolve_covered_axis(&horizontal, size, size, &kernel, false);

        let covered: Vec<f32> = image.iter().copied().filter(|&d| d > 0.0).collect();
        let min = covered.iter().copied().fold(f32::INFINITY, f32::min);
        let max = covered.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        for (input, output) in image.iter().zip(&blurred) {
            if *input > 0.0 {
                assert!(
                    *output >= min - 1e-5 && *output <= max + 1e-5,
                    "smoothed depth {output} outside splatted range [{min}, {max}]"
                );
            } else {
                assert_eq!(*output, 0.0, "uncovered pixel gained depth");
            }
        }

        let center = blurred[(size / 2) * size + size / 2];
        assert!(center >= 4.0 && center < 4.5, "center depth {center}");
    }

    #[test]
    fn depth_smoothing_preserves_a_constant_covered_field() {
        let (width, height) = (19, 11);
        let mut image = vec![2.5_f32; width * height];
        // A hole must not drag its neighbours toward zero.
        image[5 * width + 9] = 0.0;
        let kernel = GaussianKernel::new(KernelConfig::new(10, 5.0));

        let horizontal = convolve_covered_axis(&image, width, height, &kernel, true);
        let blurred = convolve_covered_axis(&horizontal, width, height, &kernel, false);

        for (i, value) in blurred.iter().enumerate() {
            if i == 5 * width + 9 {
                assert_eq!(*value, 0.0);
            } else {
                assert!((value - 2.5).abs() < 1e-5, "pixel {i} drifted to {value}");
            }
        }
    }
}
