//! Screen-space fluid surface reconstruction.
//!
//! [`SurfaceReconstruction`] turns a buffer of particle positions into a shaded
//! liquid surface without building a mesh. Each call to
//! [`render`](SurfaceReconstruction::render) records the passes listed in
//! [`FRAME_SCHEDULE`]:
//!
//! 1. **Particle depth** - every particle is drawn as a sphere impostor and the
//!    nearest view distance per pixel lands in the depth texture.
//! 2. **Depth smoothing** - a separable Gaussian blur pulls neighbouring
//!    spheres into one continuous surface.
//! 3. **Thickness** - the same impostors are drawn again, summing chord
//!    lengths with additive blending.
//! 4. **Thickness smoothing** - a wider, softer blur of the thickness image.
//! 5. **Composite** - normals are rebuilt from the smoothed depth and the
//!    surface is shaded over the caller's destination.
//!
//! Offscreen targets follow the requested size: they are allocated on the first
//! frame and replaced as one batch whenever width or height changes.
//!
//! # Example
//!
//! ```no_run
//! use fluid_surface::{
//!     Camera, GpuContext, Particle, ParticleBatch, SurfaceConfig, SurfaceReconstruction,
//!     create_particle_buffer,
//! };
//!
//! let gpu = GpuContext::headless()?;
//! let config = SurfaceConfig::new().target_format(wgpu::TextureFormat::Rgba8Unorm);
//! let mut fluid = SurfaceReconstruction::new(&gpu, config)?;
//!
//! let particles = [Particle::new(0.0, 0.0, 0.0), Particle::new(0.1, 0.0, 0.0)];
//! let buffer = create_particle_buffer(&gpu, "Particles", &particles);
//!
//! let target = gpu.device.create_texture(&wgpu::TextureDescriptor {
//!     label: Some("Destination"),
//!     size: wgpu::Extent3d { width: 640, height: 480, depth_or_array_layers: 1 },
//!     mip_level_count: 1,
//!     sample_count: 1,
//!     dimension: wgpu::TextureDimension::D2,
//!     format: wgpu::TextureFormat::Rgba8Unorm,
//!     usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
//!     view_formats: &[],
//! });
//! let view = target.create_view(&Default::default());
//!
//! fluid.set_camera(&gpu, &Camera::new().at(0.0, 0.5, 3.0), 640.0 / 480.0)?;
//!
//! let mut encoder = gpu.device.create_command_encoder(&Default::default());
//! fluid.render(&gpu, &mut encoder, &view, &ParticleBatch::new(&buffer, 2), 640, 480)?;
//! gpu.queue.submit(Some(encoder.finish()));
//! # Ok::<(), fluid_surface::SurfaceError>(())
//! ```

use crate::blur::{BlurJob, GaussianBlur, SeparableBlur};
use crate::camera::Camera;
use crate::config::SurfaceConfig;
use crate::error::SurfaceError;
use crate::fullscreen::FullscreenQuad;
use crate::gpu::GpuContext;
use crate::point_sprite::{ParticleBatch, ParticleRasterizer, PointSprite};
use crate::program::{
    ProgramDescriptor, ProgramInput, ShaderProgram, UniformKind, UniformLocation, UniformValue,
};
use crate::schedule::{FRAME_SCHEDULE, Pass};
use crate::targets::{
    DEPTH_FORMAT, FramebufferSlot, OffscreenExtent, OffscreenResources, OffscreenTargets,
    THICKNESS_FORMAT, TextureSlot, Z_BUFFER_FORMAT,
};
use crate::weights::{WeightBuffers, WeightSet};

const SPRITE_UNIFORMS: [(&str, UniformKind); 4] = [
    ("view", UniformKind::Mat4),
    ("proj", UniformKind::Mat4),
    ("particle_radius", UniformKind::F32),
    ("thickness_scale", UniformKind::F32),
];

const COMPOSITE_UNIFORMS: [(&str, UniformKind); 4] = [
    ("proj", UniformKind::Mat4),
    ("fluid_color", UniformKind::Vec4),
    ("inv_resolution", UniformKind::Vec2),
    ("absorption", UniformKind::F32),
];

const COMPOSITE_INPUTS: [ProgramInput; 2] = [ProgramInput::Texture, ProgramInput::Texture];

/// Adds every fragment into the target. Used to accumulate thickness.
const ADDITIVE_BLENDING: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Camera uniforms shared by the sprite programs.
#[derive(Clone, Copy)]
struct SpriteLocations {
    view: UniformLocation,
    proj: UniformLocation,
}

impl SpriteLocations {
    fn resolve(program: &ShaderProgram) -> Result<Self, SurfaceError> {
        Ok(Self {
            view: program.uniform_location("view")?,
            proj: program.uniform_location("proj")?,
        })
    }
}

/// The multi-pass screen-space surface renderer.
///
/// Owns its four programs, both weight buffers and all offscreen targets. The
/// particle buffer and destination view stay with the caller and are only
/// borrowed for the duration of [`render`](Self::render).
///
/// Uniform writes go through the queue and land at the next submission, so
/// record at most one `render` per submitted command buffer.
pub struct SurfaceReconstruction {
    config: SurfaceConfig,
    particle_depth_program: ShaderProgram,
    thickness_program: ShaderProgram,
    composite_program: ShaderProgram,
    depth_locations: SpriteLocations,
    thickness_locations: SpriteLocations,
    composite_proj: UniformLocation,
    composite_inv_resolution: UniformLocation,
    rasterizer: Box<dyn ParticleRasterizer>,
    depth_blur: Box<dyn SeparableBlur>,
    thickness_blur: Box<dyn SeparableBlur>,
    weights: WeightBuffers,
    offscreen: OffscreenResources,
    depth_offset_scale: [f32; 2],
    thickness_offset_scale: [f32; 2],
    quad: FullscreenQuad,
}

impl SurfaceReconstruction {
    /// Build the pipeline with point sprites and Gaussian blurs.
    ///
    /// Compiles every program and uploads both weight buffers. No offscreen
    /// targets exist until the first [`render`](Self::render).
    ///
    /// # Errors
    ///
    /// [`SurfaceError::ShaderCompilation`] if any program fails to build.
    pub fn new(gpu: &GpuContext, config: SurfaceConfig) -> Result<Self, SurfaceError> {
        let depth_blur = GaussianBlur::depth(gpu, DEPTH_FORMAT)?;
        let thickness_blur = GaussianBlur::new(gpu, THICKNESS_FORMAT)?;
        Self::with_parts(
            gpu,
            config,
            Box::new(PointSprite::new()),
            Box::new(depth_blur),
            Box::new(thickness_blur),
        )
    }

    /// Build the pipeline around caller-supplied collaborators.
    ///
    /// # Arguments
    ///
    /// * `rasterizer` - Feeds particle instances to the depth and thickness programs
    /// * `depth_blur` - Smooths the R32Float depth texture
    /// * `thickness_blur` - Smooths the R16Float thickness texture
    pub fn with_parts(
        gpu: &GpuContext,
        config: SurfaceConfig,
        rasterizer: Box<dyn ParticleRasterizer>,
        depth_blur: Box<dyn SeparableBlur>,
        thickness_blur: Box<dyn SeparableBlur>,
    ) -> Result<Self, SurfaceError> {
        let instance_layout = rasterizer.instance_layout();
        let topology = rasterizer.topology();
        let sprite_source = include_str!("shaders/sprite.wgsl");

        let particle_depth_program = ShaderProgram::new(
            gpu,
            &ProgramDescriptor {
                label: "Particle Depth Program",
                source: &format!(
                    "{}\n{}",
                    sprite_source,
                    include_str!("shaders/particle_depth.wgsl")
                ),
                uniforms: &SPRITE_UNIFORMS,
                inputs: &[],
                vertex_buffers: std::slice::from_ref(&instance_layout),
                topology,
                color_format: DEPTH_FORMAT,
                blend: None,
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: Z_BUFFER_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
            },
        )?;

        let thickness_program = ShaderProgram::new(
            gpu,
            &ProgramDescriptor {
                label: "Thickness Program",
                source: &format!(
                    "{}\n{}",
                    sprite_source,
                    include_str!("shaders/thickness.wgsl")
                ),
                uniforms: &SPRITE_UNIFORMS,
                inputs: &[],
                vertex_buffers: std::slice::from_ref(&instance_layout),
                topology,
                color_format: THICKNESS_FORMAT,
                blend: Some(ADDITIVE_BLENDING),
                depth_stencil: None,
            },
        )?;

        let composite_program = ShaderProgram::new(
            gpu,
            &ProgramDescriptor {
                label: "Composite Program",
                source: &format!(
                    "{}\n{}",
                    FullscreenQuad::VERTEX_SOURCE,
                    include_str!("shaders/composite.wgsl")
                ),
                uniforms: &COMPOSITE_UNIFORMS,
                inputs: &COMPOSITE_INPUTS,
                vertex_buffers: &[],
                topology: wgpu::PrimitiveTopology::TriangleList,
                color_format: config.target_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                depth_stencil: None,
            },
        )?;

        let depth_locations = SpriteLocations::resolve(&particle_depth_program)?;
        let thickness_locations = SpriteLocations::resolve(&thickness_program)?;
        let composite_proj = composite_program.uniform_location("proj")?;
        let composite_inv_resolution = composite_program.uniform_location("inv_resolution")?;

        // Constant for the lifetime of the pipeline.
        for program in [&particle_depth_program, &thickness_program] {
            program.set_named(gpu, "particle_radius", UniformValue::F32(config.particle_radius))?;
            program.set_named(gpu, "thickness_scale", UniformValue::F32(config.thickness_scale))?;
        }
        composite_program.set_named(gpu, "fluid_color", UniformValue::Vec4(config.fluid_color))?;
        composite_program.set_named(gpu, "absorption", UniformValue::F32(config.absorption))?;

        let weights = WeightBuffers::new(gpu, config.thickness_kernel, config.depth_kernel);

        log::info!(
            "surface reconstruction ready (radius {}, depth taps {}, thickness taps {})",
            config.particle_radius,
            weights.get(WeightSet::Depth).tap_count(),
            weights.get(WeightSet::Thickness).tap_count()
        );

        let mut reconstruction = Self {
            config,
            particle_depth_program,
            thickness_program,
            composite_program,
            depth_locations,
            thickness_locations,
            composite_proj,
            composite_inv_resolution,
            rasterizer,
            depth_blur,
            thickness_blur,
            weights,
            offscreen: OffscreenResources::new(),
            depth_offset_scale: [0.0; 2],
            thickness_offset_scale: [0.0; 2],
            quad: FullscreenQuad::new(),
        };
        reconstruction.set_camera(gpu, &Camera::default(), 1.0)?;
        Ok(reconstruction)
    }

    /// Settings the pipeline was built with.
    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    /// Upload view and projection matrices for the next frame.
    ///
    /// # Arguments
    ///
    /// * `camera` - Viewpoint the particles are rendered from
    /// * `aspect` - Width over height of the destination
    pub fn set_camera(
        &mut self,
        gpu: &GpuContext,
        camera: &Camera,
        aspect: f32,
    ) -> Result<(), SurfaceError> {
        let view = UniformValue::Mat4(camera.view_matrix());
        let proj = UniformValue::Mat4(camera.projection_matrix(aspect));

        for (program, locations) in [
            (&self.particle_depth_program, self.depth_locations),
            (&self.thickness_program, self.thickness_locations),
        ] {
            program.set(gpu, locations.view, view)?;
            program.set(gpu, locations.proj, proj)?;
        }
        self.composite_program.set(gpu, self.composite_proj, proj)
    }

    /// Record one frame of reconstruction into `encoder`.
    ///
    /// Offscreen targets are (re)allocated first if `width x height` differs
    /// from the previous frame. The composite blends over `target` without
    /// clearing it; pixels no particle covers are left untouched.
    ///
    /// # Arguments
    ///
    /// * `encoder` - Command encoder the passes are recorded into; the caller submits
    /// * `target` - Destination view, in [`SurfaceConfig::target_format`]
    /// * `particles` - Particle buffer and count to draw
    /// * `width`, `height` - Size of `target` in pixels
    ///
    /// # Errors
    ///
    /// * [`SurfaceError::InvalidDimensions`] for a zero or oversized extent
    /// * [`SurfaceError::ParticleBufferTooSmall`] / [`SurfaceError::ParticleBufferUsage`]
    ///   for a batch the buffer cannot feed
    /// * [`SurfaceError::ResourceAllocation`] if new targets cannot be created
    ///
    /// Validation runs before anything is allocated or recorded.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        particles: &ParticleBatch<'_>,
        width: u32,
        height: u32,
    ) -> Result<(), SurfaceError> {
        let max = gpu.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(SurfaceError::InvalidDimensions { width, height });
        }
        particles.validate(self.rasterizer.stride())?;

        if self.offscreen.ensure_size(gpu, width, height)? {
            self.on_resize(gpu, width, height)?;
        }

        let Some(targets) = self.offscreen.targets() else {
            return Err(SurfaceError::ResourceAllocation {
                label: "offscreen targets".to_string(),
                message: "no targets after allocation".to_string(),
            });
        };

        log::trace!(
            "recording fluid frame: {} particles at {width}x{height}",
            particles.count
        );

        for step in FRAME_SCHEDULE {
            match step.pass {
                Pass::ParticleDepth => self.particle_depth_pass(encoder, targets, particles),
                Pass::DepthSmoothing => self.depth_blur.blur(
                    gpu,
                    encoder,
                    &BlurJob {
                        source: targets.view(TextureSlot::Depth),
                        scratch: targets.framebuffer(FramebufferSlot::DepthBlurH),
                        destination: targets.framebuffer(FramebufferSlot::DepthBlurV),
                        weights: self.weights.get(WeightSet::Depth),
                        offset_scale: self.depth_offset_scale,
                    },
                )?,
                Pass::Thickness => self.thickness_pass(encoder, targets, particles),
                Pass::ThicknessSmoothing => self.thickness_blur.blur(
                    gpu,
                    encoder,
                    &BlurJob {
                        source: targets.view(TextureSlot::Thickness),
                        scratch: targets.framebuffer(FramebufferSlot::ThicknessBlur),
                        destination: targets.framebuffer(FramebufferSlot::Thickness),
                        weights: self.weights.get(WeightSet::Thickness),
                        offset_scale: self.thickness_offset_scale,
                    },
                )?,
                Pass::Composite => self.composite_pass(gpu, encoder, targets, target),
            }
        }
        Ok(())
    }

    /// Refresh every uniform derived from the render size.
    fn on_resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<(), SurfaceError> {
        let inv = [1.0 / width as f32, 1.0 / height as f32];
        let spread = self.config.depth_blur_spread;
        self.depth_offset_scale = [spread * inv[0], spread * inv[1]];
        self.thickness_offset_scale = inv;
        self.composite_program
            .set(gpu, self.composite_inv_resolution, UniformValue::Vec2(inv))?;

        log::debug!(
            "offscreen targets now {width}x{height} (allocation #{})",
            self.offscreen.allocation_count()
        );
        Ok(())
    }

    fn particle_depth_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &OffscreenTargets,
        particles: &ParticleBatch<'_>,
    ) {
        let mut pass = targets.framebuffer(FramebufferSlot::Depth).begin(encoder);
        self.particle_depth_program.bind_without_inputs(&mut pass);
        self.rasterizer.draw(&mut pass, particles);
    }

    fn thickness_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &OffscreenTargets,
        particles: &ParticleBatch<'_>,
    ) {
        let mut pass = targets.framebuffer(FramebufferSlot::Thickness).begin(encoder);
        self.thickness_program.bind_without_inputs(&mut pass);
        self.rasterizer.draw(&mut pass, particles);
    }

    fn composite_pass(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        targets: &OffscreenTargets,
        destination: &wgpu::TextureView,
    ) {
        let inputs = self.composite_program.create_inputs(
            gpu,
            &[
                wgpu::BindingResource::TextureView(targets.view(TextureSlot::Depth)),
                wgpu::BindingResource::TextureView(targets.view(TextureSlot::Thickness)),
            ],
        );

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Fluid Composite Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: destination,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.composite_program.bind(&mut pass);
        pass.set_bind_group(1, &inputs, &[]);
        self.quad.draw(&mut pass);
    }

    /// Current offscreen targets, or `None` before the first frame.
    pub fn targets(&self) -> Option<&OffscreenTargets> {
        self.offscreen.targets()
    }

    /// Size the offscreen targets were last allocated at.
    pub fn extent(&self) -> OffscreenExtent {
        self.offscreen.extent()
    }

    /// Number of target batches allocated so far. Grows by one per resize.
    pub fn allocation_count(&self) -> u64 {
        self.offscreen.allocation_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::UniformLayout;

    #[test]
    fn sprite_uniforms_match_sprite_wgsl() {
        let layout = UniformLayout::new(&SPRITE_UNIFORMS);
        assert_eq!(layout.location("view").map(|l| l.offset), Some(0));
        assert_eq!(layout.location("proj").map(|l| l.offset), Some(64));
        assert_eq!(layout.location("particle_radius").map(|l| l.offset), Some(128));
        assert_eq!(layout.location("thickness_scale").map(|l| l.offset), Some(132));
    }

    #[test]
    fn composite_uniforms_match_composite_wgsl() {
        let layout = UniformLayout::new(&COMPOSITE_UNIFORMS);
        assert_eq!(layout.location("fluid_color").map(|l| l.offset), Some(64));
        assert_eq!(layout.location("inv_resolution").map(|l| l.offset), Some(80));
        assert_eq!(layout.location("absorption").map(|l| l.offset), Some(88));
        assert_eq!(layout.size(), 96);
    }

    #[test]
    fn additive_blend_sums_both_channels() {
        for component in [ADDITIVE_BLENDING.color, ADDITIVE_BLENDING.alpha] {
            assert_eq!(component.src_factor, wgpu::BlendFactor::One);
            assert_eq!(component.dst_factor, wgpu::BlendFactor::One);
            assert_eq!(component.operation, wgpu::BlendOperation::Add);
        }
    }
}
