//! Shader programs: a compiled render pipeline plus its named uniforms.
//!
//! Every pass in the pipeline draws through a [`ShaderProgram`]. A program owns
//! one uniform block at `@group(0) @binding(0)` whose fields are described by a
//! [`UniformLayout`]; the layout is resolved once at construction so per-frame
//! code writes uniforms through cheap [`UniformLocation`] handles instead of
//! looking names up. Per-draw resources (textures, samplers, storage buffers)
//! live in `@group(1)`, described by a list of [`ProgramInput`]s and bound with a
//! bind group from [`ShaderProgram::create_inputs`].
//!
//! # Uniform layout
//!
//! Offsets follow WGSL uniform address-space alignment for the supported kinds:
//!
//! | Kind   | Size | Align |
//! |--------|------|-------|
//! | `F32`  | 4    | 4     |
//! | `U32`  | 4    | 4     |
//! | `Vec2` | 8    | 8     |
//! | `Vec4` | 16   | 16    |
//! | `Mat4` | 64   | 16    |
//!
//! The block size is rounded up to 16 bytes, matching the size WGSL computes for
//! the corresponding struct. `vec3` is deliberately absent: its 12-byte size with
//! 16-byte alignment is a common source of mismatches.

use glam::Mat4;

use crate::error::SurfaceError;
use crate::gpu::GpuContext;

/// The type of a uniform field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformKind {
    F32,
    U32,
    Vec2,
    Vec4,
    Mat4,
}

impl UniformKind {
    pub const fn size(self) -> u64 {
        match self {
            UniformKind::F32 | UniformKind::U32 => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec4 => 16,
            UniformKind::Mat4 => 64,
        }
    }

    pub const fn align(self) -> u64 {
        match self {
            UniformKind::F32 | UniformKind::U32 => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec4 | UniformKind::Mat4 => 16,
        }
    }
}

/// A value to write into a uniform field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    F32(f32),
    U32(u32),
    Vec2([f32; 2]),
    Vec4([f32; 4]),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::F32(_) => UniformKind::F32,
            UniformValue::U32(_) => UniformKind::U32,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }

    /// Raw little-endian bytes in WGSL layout (matrices column-major).
    pub fn bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::F32(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::U32(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Vec2(v) => bytemuck::cast_slice(v).to_vec(),
            UniformValue::Vec4(v) => bytemuck::cast_slice(v).to_vec(),
            UniformValue::Mat4(m) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
        }
    }
}

/// A resolved uniform field: where it lives in the block and what it holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformLocation {
    pub name: &'static str,
    pub offset: u64,
    pub kind: UniformKind,
}

/// Byte layout of a program's uniform block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformLayout {
    fields: Vec<UniformLocation>,
    size: u64,
}

impl UniformLayout {
    /// Lay out `fields` in declaration order.
    pub fn new(fields: &[(&'static str, UniformKind)]) -> Self {
        let mut offset: u64 = 0;
        let mut resolved = Vec::with_capacity(fields.len());
        for &(name, kind) in fields {
            offset = offset.next_multiple_of(kind.align());
            resolved.push(UniformLocation { name, offset, kind });
            offset += kind.size();
        }

        Self {
            fields: resolved,
            size: offset.next_multiple_of(16).max(16),
        }
    }

    pub fn location(&self, name: &str) -> Option<UniformLocation> {
        self.fields.iter().find(|f| f.name == name).copied()
    }

    /// Size of the uniform buffer backing this layout.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// A resource bound at `@group(1)`, in binding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramInput {
    /// `texture_2d<f32>`, unfilterable so R32Float can be bound.
    Texture,
    /// A non-filtering sampler.
    Sampler,
    /// `var<storage, read> array<f32>`.
    StorageBuffer,
    /// A small uniform block owned by the caller.
    UniformBuffer,
}

impl ProgramInput {
    fn layout_entry(self, binding: u32) -> wgpu::BindGroupLayoutEntry {
        let ty = match self {
            ProgramInput::Texture => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            ProgramInput::Sampler => {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering)
            }
            ProgramInput::StorageBuffer => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            ProgramInput::UniformBuffer => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        };
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty,
            count: None,
        }
    }
}

/// Everything needed to build a [`ShaderProgram`].
///
/// The WGSL source must define `vs` and `fs` entry points, declare the uniform
/// block at `@group(0) @binding(0)` with fields matching `uniforms`, and declare
/// `inputs` at `@group(1)` bindings `0..n`.
pub struct ProgramDescriptor<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub uniforms: &'a [(&'static str, UniformKind)],
    pub inputs: &'a [ProgramInput],
    pub vertex_buffers: &'a [wgpu::VertexBufferLayout<'a>],
    pub topology: wgpu::PrimitiveTopology,
    pub color_format: wgpu::TextureFormat,
    pub blend: Option<wgpu::BlendState>,
    pub depth_stencil: Option<wgpu::DepthStencilState>,
}

/// A compiled render pipeline with its uniform block.
pub struct ShaderProgram {
    label: String,
    pipeline: wgpu::RenderPipeline,
    uniforms: UniformLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    input_layout: wgpu::BindGroupLayout,
    empty_inputs: Option<wgpu::BindGroup>,
}

impl ShaderProgram {
    /// Compile the shader and build its pipeline.
    ///
    /// WGSL parse errors and pipeline validation errors are caught and returned
    /// as [`SurfaceError::ShaderCompilation`].
    pub fn new(gpu: &GpuContext, desc: &ProgramDescriptor<'_>) -> Result<Self, SurfaceError> {
        let uniforms = UniformLayout::new(desc.uniforms);
        let label = desc.label.to_string();

        let built = gpu.scoped(|device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(desc.source.into()),
            });

            let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("{} Uniforms", desc.label)),
                size: uniforms.size(),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            let uniform_layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("{} Uniform Layout", desc.label)),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }],
                });

            let input_entries: Vec<_> = desc
                .inputs
                .iter()
                .enumerate()
                .map(|(i, input)| input.layout_entry(i as u32))
                .collect();
            let input_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} Input Layout", desc.label)),
                entries: &input_entries,
            });

            let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{} Uniform Bind Group", desc.label)),
                layout: &uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{} Pipeline Layout", desc.label)),
                bind_group_layouts: &[&uniform_layout, &input_layout],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    buffers: desc.vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: desc.color_format,
                        blend: desc.blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: desc.topology,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: desc.depth_stencil.clone(),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

            // Programs without inputs still need group 1 bound; build it once.
            let empty_inputs = desc.inputs.is_empty().then(|| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("{} Empty Inputs", desc.label)),
                    layout: &input_layout,
                    entries: &[],
                })
            });

            (
                pipeline,
                uniform_buffer,
                uniform_bind_group,
                input_layout,
                empty_inputs,
            )
        });

        let (pipeline, uniform_buffer, uniform_bind_group, input_layout, empty_inputs) =
            built.map_err(|message| SurfaceError::ShaderCompilation {
                label: label.clone(),
                message,
            })?;

        log::debug!(
            "compiled program '{}' ({} uniform bytes)",
            label,
            uniforms.size()
        );

        Ok(Self {
            label,
            pipeline,
            uniforms,
            uniform_buffer,
            uniform_bind_group,
            input_layout,
            empty_inputs,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn uniform_layout(&self) -> &UniformLayout {
        &self.uniforms
    }

    /// The cached `@group(1)` bind group of a program declared with no inputs.
    pub fn empty_inputs(&self) -> Option<&wgpu::BindGroup> {
        self.empty_inputs.as_ref()
    }

    /// Resolve a uniform by name.
    pub fn uniform_location(&self, name: &str) -> Result<UniformLocation, SurfaceError> {
        self.uniforms
            .location(name)
            .ok_or_else(|| SurfaceError::UnknownUniform {
                program: self.label.clone(),
                name: name.to_string(),
            })
    }

    /// Queue a uniform write. Takes effect at the next queue submission.
    pub fn set(
        &self,
        gpu: &GpuContext,
        location: UniformLocation,
        value: UniformValue,
    ) -> Result<(), SurfaceError> {
        if value.kind() != location.kind {
            return Err(SurfaceError::UniformKindMismatch {
                name: location.name.to_string(),
                expected: location.kind,
                actual: value.kind(),
            });
        }
        gpu.queue
            .write_buffer(&self.uniform_buffer, location.offset, &value.bytes());
        Ok(())
    }

    /// Resolve and write in one step. Prefer cached locations on hot paths.
    pub fn set_named(
        &self,
        gpu: &GpuContext,
        name: &str,
        value: UniformValue,
    ) -> Result<(), SurfaceError> {
        let location = self.uniform_location(name)?;
        self.set(gpu, location, value)
    }

    /// Build the `@group(1)` bind group from resources in binding order.
    pub fn create_inputs(
        &self,
        gpu: &GpuContext,
        resources: &[wgpu::BindingResource<'_>],
    ) -> wgpu::BindGroup {
        let entries: Vec<_> = resources
            .iter()
            .enumerate()
            .map(|(i, resource)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: resource.clone(),
            })
            .collect();

        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Inputs", self.label)),
            layout: &self.input_layout,
            entries: &entries,
        })
    }

    /// Bind the pipeline and uniform block. Group 1 is left to the caller.
    pub fn bind(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
    }

    /// Bind the pipeline, uniform block and the cached empty input group.
    ///
    /// For programs declared with no inputs. A program with inputs leaves
    /// group 1 unbound and the draw fails validation.
    pub fn bind_without_inputs(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        self.bind(render_pass);
        match &self.empty_inputs {
            Some(inputs) => render_pass.set_bind_group(1, inputs, &[]),
            None => log::warn!(
                "program '{}' declares inputs but was bound without them",
                self.label
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_wgsl_struct_rules() {
        // struct { view: mat4x4f, proj: mat4x4f, particle_radius: f32, thickness_scale: f32 }
        let layout = UniformLayout::new(&[
            ("view", UniformKind::Mat4),
            ("proj", UniformKind::Mat4),
            ("particle_radius", UniformKind::F32),
            ("thickness_scale", UniformKind::F32),
        ]);
        assert_eq!(layout.location("proj").map(|l| l.offset), Some(64));
        assert_eq!(layout.location("particle_radius").map(|l| l.offset), Some(128));
        assert_eq!(layout.location("thickness_scale").map(|l| l.offset), Some(132));
        assert_eq!(layout.size(), 144);
    }

    #[test]
    fn layout_pads_to_alignment() {
        // struct { tap_count: u32, offset_scale: vec2f, color: vec4f }
        let layout = UniformLayout::new(&[
            ("tap_count", UniformKind::U32),
            ("offset_scale", UniformKind::Vec2),
            ("color", UniformKind::Vec4),
        ]);
        assert_eq!(layout.location("offset_scale").map(|l| l.offset), Some(8));
        assert_eq!(layout.location("color").map(|l| l.offset), Some(16));
        assert_eq!(layout.size(), 32);
    }

    #[test]
    fn empty_layout_still_has_a_binding_size() {
        assert_eq!(UniformLayout::new(&[]).size(), 16);
    }

    #[test]
    fn unknown_names_resolve_to_none() {
        let layout = UniformLayout::new(&[("a", UniformKind::F32)]);
        assert!(layout.location("b").is_none());
    }

    #[test]
    fn matrix_bytes_are_column_major() {
        let m = Mat4::from_cols_array(&[
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0,
        ]);
        let bytes = UniformValue::Mat4(m).bytes();
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(floats.len(), 16);
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[4], 5.0);
        assert_eq!(floats[15], 16.0);
    }
}
