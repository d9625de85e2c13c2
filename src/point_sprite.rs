//! Particle rasterization as camera-facing point sprites.
//!
//! The depth and thickness passes both draw every particle as a quad expanded
//! around its view-space center. How that draw is issued is behind the
//! [`ParticleRasterizer`] trait so a different strategy (icospheres, compute
//! splatting) can be substituted without touching the orchestrator; the
//! programs are built against the rasterizer's [`instance_layout`](ParticleRasterizer::instance_layout)
//! so the two always agree.

use wgpu::util::DeviceExt;

use crate::error::SurfaceError;
use crate::gpu::GpuContext;

/// One particle record as laid out in a GPU buffer.
///
/// Only `xyz` is read; `w` keeps the record 16 bytes so the same buffer can be
/// bound as a std430 `array<vec4f>` by a simulation. The radius is implicit and
/// shared by all particles (see [`SurfaceConfig::particle_radius`](crate::SurfaceConfig)).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Particle {
    pub position: [f32; 4],
}

impl Particle {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: [x, y, z, 1.0],
        }
    }
}

/// Bytes of a record the sprite shader actually reads (`vec3f` position).
pub const POSITION_BYTES: u64 = 12;

/// A caller-owned particle buffer and the number of records to draw.
///
/// `offset` is the byte offset of the first record, for buffers that pack
/// particles after other data.
#[derive(Clone, Copy, Debug)]
pub struct ParticleBatch<'a> {
    pub buffer: &'a wgpu::Buffer,
    pub count: u32,
    pub offset: u64,
}

impl<'a> ParticleBatch<'a> {
    pub fn new(buffer: &'a wgpu::Buffer, count: u32) -> Self {
        Self {
            buffer,
            count,
            offset: 0,
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Check that the buffer can feed `count` instances at `stride`.
    ///
    /// An empty batch is always valid: nothing will be read from the buffer.
    pub fn validate(&self, stride: u64) -> Result<(), SurfaceError> {
        if self.count == 0 {
            return Ok(());
        }
        if !self.buffer.usage().contains(wgpu::BufferUsages::VERTEX) {
            return Err(SurfaceError::ParticleBufferUsage);
        }
        check_layout(self.count, stride, self.offset, self.buffer.size())
    }
}

/// Smallest buffer size holding `count` records at `stride` after `offset`.
///
/// `None` when the size does not fit in a `u64`.
pub fn required_bytes(count: u32, stride: u64, offset: u64) -> Option<u64> {
    if count == 0 {
        return Some(offset);
    }
    (count as u64 - 1)
        .checked_mul(stride)?
        .checked_add(POSITION_BYTES)?
        .checked_add(offset)
}

/// Offset alignment and size checks for a non-empty batch in a buffer of
/// `available` bytes.
fn check_layout(count: u32, stride: u64, offset: u64, available: u64) -> Result<(), SurfaceError> {
    if offset % wgpu::VERTEX_ALIGNMENT != 0 {
        return Err(SurfaceError::ParticleBufferOffset {
            offset,
            alignment: wgpu::VERTEX_ALIGNMENT,
        });
    }
    match required_bytes(count, stride, offset) {
        Some(required) if required <= available => Ok(()),
        required => Err(SurfaceError::ParticleBufferTooSmall {
            required: required.unwrap_or(u64::MAX),
            available,
        }),
    }
}

/// Upload particles into a new buffer usable by [`ParticleBatch`].
///
/// The buffer also carries `STORAGE` and `COPY_DST` so a simulation can write
/// into it directly.
pub fn create_particle_buffer(gpu: &GpuContext, label: &str, particles: &[Particle]) -> wgpu::Buffer {
    gpu.device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(particles),
            usage: wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST,
        })
}

/// Something that can draw a particle batch into an open render pass.
///
/// The program bound before [`draw`](Self::draw) decides what gets written
/// (depth, thickness); the rasterizer only decides how instances are fed.
pub trait ParticleRasterizer {
    /// Per-instance vertex layout. Location 0 must be the `vec3f` position.
    fn instance_layout(&self) -> wgpu::VertexBufferLayout<'static>;

    /// Primitive topology the rasterizer's draws assume.
    fn topology(&self) -> wgpu::PrimitiveTopology;

    /// Byte distance between consecutive particle records.
    fn stride(&self) -> u64;

    /// Draw `batch.count` instances.
    fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>, batch: &ParticleBatch<'_>);
}

const SPRITE_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

/// Instanced point sprites: four strip vertices per particle.
///
/// The vertex shader (`shaders/sprite.wgsl`) expands each corner by the
/// particle radius in view space, so sprites always face the camera.
#[derive(Clone, Copy, Debug)]
pub struct PointSprite {
    stride: u64,
}

impl Default for PointSprite {
    fn default() -> Self {
        Self {
            stride: std::mem::size_of::<Particle>() as u64,
        }
    }
}

impl PointSprite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read positions from records `stride` bytes apart.
    ///
    /// The stride must be at least 12 bytes and a multiple of 4.
    pub fn with_stride(stride: u64) -> Self {
        Self {
            stride: stride.max(POSITION_BYTES).next_multiple_of(4),
        }
    }
}

impl ParticleRasterizer for PointSprite {
    fn instance_layout(&self) -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: self.stride,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &SPRITE_ATTRIBUTES,
        }
    }

    fn topology(&self) -> wgpu::PrimitiveTopology {
        wgpu::PrimitiveTopology::TriangleStrip
    }

    fn stride(&self) -> u64 {
        self.stride
    }

    fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>, batch: &ParticleBatch<'_>) {
        if batch.count == 0 {
            return;
        }
        render_pass.set_vertex_buffer(0, batch.buffer.slice(batch.offset..));
        render_pass.draw(0..4, 0..batch.count);
    }
}
