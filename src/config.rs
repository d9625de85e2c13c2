use crate::weights::KernelConfig;

/// Tunable parameters of the reconstruction pipeline.
///
/// Everything here is fixed at construction: kernels are uploaded once and
/// programs are compiled for `target_format`.
///
/// # Example
/// ```
/// use fluid_surface::SurfaceConfig;
///
/// let config = SurfaceConfig::new()
///     .target_format(wgpu::TextureFormat::Bgra8UnormSrgb)
///     .particle_radius(0.05)
///     .fluid_color([0.1, 0.4, 0.8, 1.0]);
/// assert_eq!(config.particle_radius, 0.05);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceConfig {
    /// Format of the destination view passed to `render`.
    pub target_format: wgpu::TextureFormat,
    /// World-space radius shared by every particle.
    pub particle_radius: f32,
    pub thickness_kernel: KernelConfig,
    pub depth_kernel: KernelConfig,
    /// Depth blur tap spacing in pixels. Scaled by `1 / resolution` into the
    /// `depth_blur_offset_scale` uniform.
    pub depth_blur_spread: f32,
    /// Multiplier on each particle's thickness contribution.
    pub thickness_scale: f32,
    /// Base color of the liquid; alpha scales overall opacity.
    pub fluid_color: [f32; 4],
    /// Beer-Lambert absorption coefficient applied to thickness.
    pub absorption: f32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            target_format: wgpu::TextureFormat::Bgra8UnormSrgb,
            particle_radius: 0.1,
            thickness_kernel: KernelConfig::new(8, 4.0),
            depth_kernel: KernelConfig::new(10, 5.0),
            depth_blur_spread: 1.0,
            thickness_scale: 1.0,
            fluid_color: [0.15, 0.45, 0.85, 1.0],
            absorption: 2.0,
        }
    }
}

impl SurfaceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.target_format = format;
        self
    }

    pub fn particle_radius(mut self, radius: f32) -> Self {
        self.particle_radius = radius;
        self
    }

    pub fn thickness_kernel(mut self, radius: u32, sigma: f32) -> Self {
        self.thickness_kernel = KernelConfig::new(radius, sigma);
        self
    }

    pub fn depth_kernel(mut self, radius: u32, sigma: f32) -> Self {
        self.depth_kernel = KernelConfig::new(radius, sigma);
        self
    }

    pub fn depth_blur_spread(mut self, spread: f32) -> Self {
        self.depth_blur_spread = spread;
        self
    }

    pub fn thickness_scale(mut self, scale: f32) -> Self {
        self.thickness_scale = scale;
        self
    }

    pub fn fluid_color(mut self, color: [f32; 4]) -> Self {
        self.fluid_color = color;
        self
    }

    pub fn absorption(mut self, absorption: f32) -> Self {
        self.absorption = absorption;
        self
    }
}
