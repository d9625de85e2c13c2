//! # fluid-surface
//!
//! **Screen-space liquid surfaces from point particles, on wgpu.**
//!
//! Particles from a fluid simulation are splatted into depth and thickness
//! images, smoothed with separable Gaussian blurs and shaded in a single
//! full-screen composite. No mesh is ever built, so the cost depends on screen
//! resolution and particle count only.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fluid_surface::*;
//!
//! let gpu = GpuContext::headless()?;
//! let mut fluid = SurfaceReconstruction::new(
//!     &gpu,
//!     SurfaceConfig::new()
//!         .target_format(wgpu::TextureFormat::Rgba8Unorm)
//!         .particle_radius(0.05),
//! )?;
//!
//! let particles: Vec<Particle> = (0..64)
//!     .map(|i| Particle::new((i % 8) as f32 * 0.08, (i / 8) as f32 * 0.08, 0.0))
//!     .collect();
//! let buffer = create_particle_buffer(&gpu, "Particles", &particles);
//! # let view: wgpu::TextureView = unimplemented!();
//!
//! fluid.set_camera(&gpu, &Camera::new().at(0.3, 0.3, 2.0), 1.0)?;
//! let mut encoder = gpu.device.create_command_encoder(&Default::default());
//! fluid.render(&gpu, &mut encoder, &view, &ParticleBatch::new(&buffer, 64), 512, 512)?;
//! gpu.queue.submit(Some(encoder.finish()));
//! # Ok::<(), SurfaceError>(())
//! ```
//!
//! ## Extension points
//!
//! - [`ParticleRasterizer`] decides how particle instances reach the depth and
//!   thickness programs ([`PointSprite`] by default).
//! - [`SeparableBlur`] smooths one texture in two passes ([`GaussianBlur`] by
//!   default).
//!
//! Both are injected through [`SurfaceReconstruction::with_parts`].

mod blur;
mod camera;
mod config;
mod error;
mod fullscreen;
mod gpu;
mod point_sprite;
mod program;
mod schedule;
mod surface;
mod targets;
mod weights;

pub use blur::{BlurJob, GaussianBlur, SeparableBlur};
pub use camera::Camera;
pub use config::SurfaceConfig;
pub use error::SurfaceError;
pub use fullscreen::FullscreenQuad;
pub use gpu::{GpuContext, WindowSurface};
pub use point_sprite::{
    POSITION_BYTES, Particle, ParticleBatch, ParticleRasterizer, PointSprite,
    create_particle_buffer, required_bytes,
};
pub use program::{
    ProgramDescriptor, ProgramInput, ShaderProgram, UniformKind, UniformLayout, UniformLocation,
    UniformValue,
};
pub use schedule::{FRAME_SCHEDULE, Pass, PassStep};
pub use surface::SurfaceReconstruction;
pub use targets::{
    DEPTH_FORMAT, Framebuffer, FramebufferSlot, OffscreenExtent, OffscreenResources,
    OffscreenTargets, THICKNESS_FORMAT, TextureSlot, Z_BUFFER_FORMAT,
};
pub use weights::{GaussianKernel, KernelConfig, WeightBuffer, WeightBuffers, WeightSet};
