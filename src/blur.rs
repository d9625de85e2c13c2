//! Separable blur utility.
//!
//! A [`SeparableBlur`] smooths one texture into a framebuffer in two passes:
//! horizontal into a scratch framebuffer, then vertical into the destination.
//! The orchestrator treats each call as one logical smoothing step and does not
//! care how it is carried out, so a compute-shader blur could be dropped in
//! behind the same trait.

use crate::error::SurfaceError;
use crate::fullscreen::FullscreenQuad;
use crate::gpu::GpuContext;
use crate::program::{
    ProgramDescriptor, ProgramInput, ShaderProgram, UniformKind, UniformLocation, UniformValue,
};
use crate::targets::Framebuffer;
use crate::weights::WeightBuffer;

/// Inputs and outputs of one blur.
pub struct BlurJob<'a> {
    /// Texture sampled by the horizontal pass.
    pub source: &'a wgpu::TextureView,
    /// Receives the horizontal pass; sampled by the vertical pass.
    pub scratch: &'a Framebuffer,
    /// Receives the vertical pass.
    pub destination: &'a Framebuffer,
    pub weights: &'a WeightBuffer,
    /// Distance between taps in UV units, per axis. Usually a multiple of
    /// `1 / resolution` so the kernel covers the same pixel footprint at any size.
    pub offset_scale: [f32; 2],
}

/// A two-pass separable smoothing operation.
pub trait SeparableBlur {
    /// Record both passes of `job` into `encoder`.
    ///
    /// Uniform writes go through the queue, so an implementation may hold only
    /// one job's parameters per submission.
    fn blur(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        job: &BlurJob<'_>,
    ) -> Result<(), SurfaceError>;
}

/// Uniform layout shared by all Gaussian blur programs. The first field's name
/// varies per program.
fn blur_uniforms(offset_name: &'static str) -> [(&'static str, UniformKind); 2] {
    [(offset_name, UniformKind::Vec2), ("tap_count", UniformKind::U32)]
}

const BLUR_INPUTS: [ProgramInput; 4] = [
    ProgramInput::Texture,
    ProgramInput::Sampler,
    ProgramInput::StorageBuffer,
    ProgramInput::UniformBuffer,
];

/// Fullscreen-shader Gaussian blur.
///
/// Reads the kernel from a [`WeightBuffer`] and samples with a clamp-to-edge,
/// nearest sampler, so taps land on texel centers and unfilterable formats such
/// as R32Float work.
pub struct GaussianBlur {
    program: ShaderProgram,
    offset_scale: UniformLocation,
    tap_count: UniformLocation,
    sampler: wgpu::Sampler,
    horizontal: wgpu::Buffer,
    vertical: wgpu::Buffer,
    quad: FullscreenQuad,
}

impl GaussianBlur {
    /// Generic blur for textures of `format`, uniform `offset_scale`.
    pub fn new(gpu: &GpuContext, format: wgpu::TextureFormat) -> Result<Self, SurfaceError> {
        let program = Self::compile(
            gpu,
            "Gaussian Blur Program",
            include_str!("shaders/blur.wgsl"),
            "offset_scale",
            format,
        )?;
        Self::with_program(gpu, program, "offset_scale")
    }

    /// Depth smoothing blur, uniform `depth_blur_offset_scale`.
    ///
    /// Keeps zero-coverage pixels at zero; see `shaders/depth_blur.wgsl`.
    pub fn depth(gpu: &GpuContext, format: wgpu::TextureFormat) -> Result<Self, SurfaceError> {
        let program = Self::compile(
            gpu,
            "Depth Blur Program",
            include_str!("shaders/depth_blur.wgsl"),
            "depth_blur_offset_scale",
            format,
        )?;
        Self::with_program(gpu, program, "depth_blur_offset_scale")
    }

    /// Build a blur around an existing program.
    ///
    /// The program must follow the blur binding layout: `offset_name` (vec2)
    /// and `tap_count` (u32) uniforms, and texture, sampler, weights, direction
    /// at `@group(1)`.
    pub fn with_program(
        gpu: &GpuContext,
        program: ShaderProgram,
        offset_name: &str,
    ) -> Result<Self, SurfaceError> {
        let offset_scale = program.uniform_location(offset_name)?;
        let tap_count = program.uniform_location("tap_count")?;

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Blur Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            program,
            offset_scale,
            tap_count,
            sampler,
            horizontal: direction_buffer(gpu, "Blur Direction H", [1.0, 0.0]),
            vertical: direction_buffer(gpu, "Blur Direction V", [0.0, 1.0]),
            quad: FullscreenQuad::new(),
        })
    }

    /// Compile a blur shader (fragment only) with the blur binding layout.
    pub fn compile(
        gpu: &GpuContext,
        label: &str,
        fragment_source: &str,
        offset_name: &'static str,
        format: wgpu::TextureFormat,
    ) -> Result<ShaderProgram, SurfaceError> {
        let source = format!("{}\n{}", FullscreenQuad::VERTEX_SOURCE, fragment_source);
        ShaderProgram::new(
            gpu,
            &ProgramDescriptor {
                label,
                source: &source,
                uniforms: &blur_uniforms(offset_name),
                inputs: &BLUR_INPUTS,
                vertex_buffers: &[],
                topology: wgpu::PrimitiveTopology::TriangleList,
                color_format: format,
                blend: None,
                depth_stencil: None,
            },
        )
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    fn pass(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        input: &wgpu::TextureView,
        output: &Framebuffer,
        weights: &WeightBuffer,
        direction: &wgpu::Buffer,
    ) {
        let inputs = self.program.create_inputs(
            gpu,
            &[
                wgpu::BindingResource::TextureView(input),
                wgpu::BindingResource::Sampler(&self.sampler),
                weights.buffer().as_entire_binding(),
                direction.as_entire_binding(),
            ],
        );

        let mut render_pass = output.begin(encoder);
        self.program.bind(&mut render_pass);
        render_pass.set_bind_group(1, &inputs, &[]);
        self.quad.draw(&mut render_pass);
    }
}

impl SeparableBlur for GaussianBlur {
    fn blur(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        job: &BlurJob<'_>,
    ) -> Result<(), SurfaceError> {
        self.program
            .set(gpu, self.offset_scale, UniformValue::Vec2(job.offset_scale))?;
        self.program
            .set(gpu, self.tap_count, UniformValue::U32(job.weights.tap_count()))?;

        self.pass(
            gpu,
            encoder,
            job.source,
            job.scratch,
            job.weights,
            &self.horizontal,
        );
        self.pass(
            gpu,
            encoder,
            job.scratch.color_view(),
            job.destination,
            job.weights,
            &self.vertical,
        );
        Ok(())
    }
}

fn direction_buffer(gpu: &GpuContext, label: &str, axis: [f32; 2]) -> wgpu::Buffer {
    use wgpu::util::DeviceExt;

    let padded = [axis[0], axis[1], 0.0, 0.0];
    gpu.device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&padded),
            usage: wgpu::BufferUsages::UNIFORM,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_uniform_layout_fits_wgsl_params() {
        let layout = crate::program::UniformLayout::new(&blur_uniforms("offset_scale"));
        assert_eq!(layout.location("offset_scale").map(|l| l.offset), Some(0));
        assert_eq!(layout.location("tap_count").map(|l| l.offset), Some(8));
        assert_eq!(layout.size(), 16);
    }

    #[test]
    fn depth_blur_uses_its_own_offset_name() {
        let layout = crate::program::UniformLayout::new(&blur_uniforms("depth_blur_offset_scale"));
        assert!(layout.location("depth_blur_offset_scale").is_some());
        assert!(layout.location("offset_scale").is_none());
    }
}
